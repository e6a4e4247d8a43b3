/// Source table names shared by the cleaning rules, the derivations and storage layout.
pub const CUSTOMERS: &str = "Customers";
pub const PRODUCTS: &str = "Products";
pub const AGENTS: &str = "Agents";
pub const STORES: &str = "Stores";
pub const ONLINE_TRANSACTIONS: &str = "OnlineTransactions";
pub const IN_STORE_TRANSACTIONS: &str = "InStoreTransactions";
pub const CUSTOMER_SERVICE_INTERACTIONS: &str = "CustomerServiceInteractions";
pub const LOYALTY_ACCOUNTS: &str = "LoyaltyAccounts";
pub const LOYALTY_TRANSACTIONS: &str = "LoyaltyTransactions";

// Derived table names
pub const AOV_PRODUCT_CATEGORY_LOCATION: &str = "AOV_Product_Category_Location";
pub const CUSTOMER_SEGMENTATION: &str = "Customer_Segmentation";
pub const PEAK_DAY_HOUR_BY_CHANNEL: &str = "Peak_DayHour_By_Channel";
pub const AGENT_INTERACTION_SUMMARY: &str = "Agent_Interaction_Summary";

// Sales channels
pub const CHANNEL_ONLINE: &str = "Online";
pub const CHANNEL_IN_STORE: &str = "InStore";

// Segment labels, in rule priority order
pub const SEGMENT_HIGH_VALUE: &str = "High-Value Customers";
pub const SEGMENT_ONE_TIME: &str = "One-Time Buyers";
pub const SEGMENT_LOYALTY_CHAMPIONS: &str = "Loyalty Champions";
pub const SEGMENT_REGULAR: &str = "Regular";

pub const RESOLVED_STATUS: &str = "Resolved";

/// Loyalty tiers that qualify a customer as a loyalty champion.
pub const CHAMPION_TIERS: [&str; 4] = ["Gold", "Platinum", "Diamond", "Elite"];

pub const DEFAULT_SPEND_BUCKETS: u32 = 10;

/// Suffix appended to a source table's file stem in the silver layer.
pub const VALIDATED_SUFFIX: &str = "_cleaned";

/// Every source table with a cleaning rule, in catalog order.
pub fn source_tables() -> Vec<&'static str> {
    vec![
        CUSTOMERS,
        PRODUCTS,
        AGENTS,
        STORES,
        ONLINE_TRANSACTIONS,
        IN_STORE_TRANSACTIONS,
        CUSTOMER_SERVICE_INTERACTIONS,
        LOYALTY_ACCOUNTS,
        LOYALTY_TRANSACTIONS,
    ]
}
