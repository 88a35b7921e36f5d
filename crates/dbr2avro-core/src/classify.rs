// Service classification
//
// Maps (ProductName, Operation, UsageType) to a short service label. Rules are
// evaluated in order and overlap, so order decides precedence.

use crate::columns::literal::{EC2_PRODUCT, RDS_PRODUCT};

pub const UNKNOWN_SERVICE: &str = "Unknown";

/// Products with a fixed short code
const PRODUCT_CODES: &[(&str, &str)] = &[
    ("Amazon RDS Service", "RDS"),
    ("Amazon Elastic MapReduce", "EMR"),
    ("Amazon Simple Storage Service", "S3"),
    ("Amazon Simple Email Service", "SES"),
];

/// EC2 operations billed as data transfer
const DATA_TRANSFER_OPERATIONS: &[&str] = &[
    "VPCPeering-In",
    "VPCPeering-Out",
    "PublicIP-In",
    "PublicIP-Out",
    "InterZone-In",
    "InterZone-Out",
    "NatGateway",
];

const RDS_BACKUP_USAGE: &str = "RDS:ChargedBackupUsage";

/// Vendor prefixes stripped by the fallback rule
const VENDOR_PREFIXES: &[&str] = &["Amazon ", "AWS "];

/// Classify a billing line into a service label.
///
/// The label borrows from `product_name` when it is derived from it.
pub fn classify_service<'a>(product_name: &'a str, operation: &str, usage_type: &str) -> &'a str {
    if product_name.is_empty() {
        return UNKNOWN_SERVICE;
    }

    if product_name == EC2_PRODUCT {
        return classify_ec2(operation, usage_type);
    }

    if product_name == RDS_PRODUCT {
        return classify_rds(usage_type);
    }

    if let Some((_, code)) = PRODUCT_CODES.iter().find(|(name, _)| *name == product_name) {
        return *code;
    }

    for prefix in VENDOR_PREFIXES {
        if let Some(rest) = product_name.strip_prefix(prefix) {
            return rest.trim();
        }
    }

    product_name
}

fn classify_ec2(operation: &str, usage_type: &str) -> &'static str {
    if operation.is_empty() {
        "EC2-Other"
    } else if usage_type.starts_with("SpotUsage:") {
        "EC2-Spot"
    } else if operation.starts_with("RunInstances") {
        "EC2-Instances"
    } else if operation.starts_with("LoadBalancing") {
        "EC2-ELB"
    } else if operation.contains("EBS:") || usage_type.contains("EBS:") {
        "EC2-EBS"
    } else if is_data_transfer(operation) {
        "Data Transfer"
    } else {
        "EC2-Other"
    }
}

fn classify_rds(usage_type: &str) -> &'static str {
    if usage_type == RDS_BACKUP_USAGE {
        "RDS:Backup"
    } else if usage_type.starts_with("Aurora:") {
        "RDS:Aurora"
    } else {
        "RDS"
    }
}

fn is_data_transfer(operation: &str) -> bool {
    DATA_TRANSFER_OPERATIONS.contains(&operation)
}
