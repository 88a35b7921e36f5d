//! Column and field name constants for the billing report pipeline.
//!
//! Two groups of names are used throughout the crate:
//!
//! - **Report columns**: header names of the Detailed Billing Report (with
//!   resources and tags). Logical columns are resolved from the header by these
//!   names, never by position.
//! - **Derived fields**: fields computed by the transformer and appended to
//!   every schema in a fixed order.

/// Header names of the canonical 22-column Detailed Billing Report layout.
///
/// Tag columns (`user:*`, `aws:*`, `resourceTags:*`) follow these in real
/// exports and are carried through as string fields.
pub mod report {
    pub const INVOICE_ID: &str = "InvoiceID";
    pub const PAYER_ACCOUNT_ID: &str = "PayerAccountId";
    pub const LINKED_ACCOUNT_ID: &str = "LinkedAccountId";
    pub const RECORD_TYPE: &str = "RecordType";
    pub const RECORD_ID: &str = "RecordId";
    pub const PRODUCT_NAME: &str = "ProductName";
    pub const RATE_ID: &str = "RateId";
    pub const SUBSCRIPTION_ID: &str = "SubscriptionId";
    pub const PRICING_PLAN_ID: &str = "PricingPlanId";
    pub const USAGE_TYPE: &str = "UsageType";
    pub const OPERATION: &str = "Operation";
    pub const AVAILABILITY_ZONE: &str = "AvailabilityZone";
    pub const RESERVED_INSTANCE: &str = "ReservedInstance";
    pub const ITEM_DESCRIPTION: &str = "ItemDescription";
    pub const USAGE_START_DATE: &str = "UsageStartDate";
    pub const USAGE_END_DATE: &str = "UsageEndDate";
    pub const USAGE_QUANTITY: &str = "UsageQuantity";
    pub const BLENDED_RATE: &str = "BlendedRate";
    pub const BLENDED_COST: &str = "BlendedCost";
    pub const UN_BLENDED_RATE: &str = "UnBlendedRate";
    pub const UN_BLENDED_COST: &str = "UnBlendedCost";
    pub const RESOURCE_ID: &str = "ResourceId";

    /// The canonical header, in export order.
    pub const CANONICAL: [&str; 22] = [
        INVOICE_ID,
        PAYER_ACCOUNT_ID,
        LINKED_ACCOUNT_ID,
        RECORD_TYPE,
        RECORD_ID,
        PRODUCT_NAME,
        RATE_ID,
        SUBSCRIPTION_ID,
        PRICING_PLAN_ID,
        USAGE_TYPE,
        OPERATION,
        AVAILABILITY_ZONE,
        RESERVED_INSTANCE,
        ITEM_DESCRIPTION,
        USAGE_START_DATE,
        USAGE_END_DATE,
        USAGE_QUANTITY,
        BLENDED_RATE,
        BLENDED_COST,
        UN_BLENDED_RATE,
        UN_BLENDED_COST,
        RESOURCE_ID,
    ];
}

/// Names of the computed fields, appended after the report columns.
pub mod derived {
    pub const SERVICE: &str = "Service";
    pub const INSTANCE_USAGE: &str = "InstanceUsage";
    pub const INSTANCE_TYPE: &str = "InstanceType";
    pub const INSTANCE_CLASS: &str = "InstanceClass";
    pub const SUBSCRIPTION_PREPAY: &str = "SubscriptionPrepay";
    pub const SUBSCRIPTION_CHARGE: &str = "SubscriptionCharge";
    pub const START_DATE: &str = "StartDate";

    /// Number of derived fields at the tail of every schema
    pub const COUNT: usize = 7;
}

/// Product and operation literals the decision rules match against.
pub mod literal {
    pub const EC2_PRODUCT: &str = "Amazon Elastic Compute Cloud";
    pub const RDS_PRODUCT: &str = "Amazon RDS Service";
    pub const RUN_INSTANCES: &str = "RunInstances";
}
