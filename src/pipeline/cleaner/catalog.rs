//! Cleaning rules for every source table in the landing zone.

use lakehouse_core::TableSchema;

use super::rule::CleaningRule;
use crate::constants::*;

/// All source tables, in catalog order.
pub fn default_rules() -> Vec<CleaningRule> {
    vec![
        customers(),
        products(),
        agents(),
        stores(),
        online_transactions(),
        in_store_transactions(),
        customer_service_interactions(),
        loyalty_accounts(),
        loyalty_transactions(),
    ]
}

pub fn customers() -> CleaningRule {
    CleaningRule::new(
        CUSTOMERS,
        TableSchema::new()
            .integer("CustomerID")
            .text("Name")
            .text("Email")
            .text("Address"),
    )
    .dedup_on(&["CustomerID"])
    .require(&["CustomerID", "Name", "Email"])
}

pub fn products() -> CleaningRule {
    CleaningRule::new(
        PRODUCTS,
        TableSchema::new()
            .integer("ProductID")
            .text("Name")
            .text("Category")
            .currency("Price"),
    )
    .dedup_on(&["ProductID"])
    .require(&["ProductID", "Name", "Category", "Price"])
    .coerce_currency(&["Price"])
}

pub fn agents() -> CleaningRule {
    CleaningRule::new(
        AGENTS,
        TableSchema::new()
            .integer("AgentID")
            .text("Name")
            .text("Department")
            .text("Shift"),
    )
    .dedup_on(&["AgentID"])
    .require(&["AgentID", "Name"])
}

pub fn stores() -> CleaningRule {
    CleaningRule::new(
        STORES,
        TableSchema::new()
            .integer("StoreID")
            .text("Location")
            .text("Manager")
            .text("OpenHours"),
    )
    .dedup_on(&["StoreID"])
    .require(&["StoreID", "Location"])
}

pub fn online_transactions() -> CleaningRule {
    CleaningRule::new(
        ONLINE_TRANSACTIONS,
        TableSchema::new()
            .integer("OrderID")
            .integer("CustomerID")
            .integer("ProductID")
            .text("DateTime")
            .text("PaymentMethod")
            .currency("Amount")
            .text("Status"),
    )
    .dedup_on(&["OrderID"])
    .require(&["OrderID", "CustomerID", "ProductID", "Amount"])
    .coerce_currency(&["Amount"])
}

pub fn in_store_transactions() -> CleaningRule {
    CleaningRule::new(
        IN_STORE_TRANSACTIONS,
        TableSchema::new()
            .integer("TransactionID")
            .integer("CustomerID")
            .integer("StoreID")
            .text("DateTime")
            .currency("Amount")
            .text("PaymentMethod"),
    )
    .dedup_on(&["TransactionID"])
    .require(&["TransactionID", "CustomerID", "StoreID", "Amount"])
    .coerce_currency(&["Amount"])
}

pub fn customer_service_interactions() -> CleaningRule {
    CleaningRule::new(
        CUSTOMER_SERVICE_INTERACTIONS,
        TableSchema::new()
            .integer("InteractionID")
            .integer("CustomerID")
            .text("DateTime")
            .integer("AgentID")
            .text("IssueType")
            .text("ResolutionStatus"),
    )
    .dedup_on(&["InteractionID"])
    .require(&["InteractionID", "CustomerID", "AgentID"])
}

pub fn loyalty_accounts() -> CleaningRule {
    CleaningRule::new(
        LOYALTY_ACCOUNTS,
        TableSchema::new()
            .integer("LoyaltyID")
            .integer("CustomerID")
            .integer("PointsEarned")
            .text("TierLevel")
            .text("JoinDate"),
    )
    .dedup_on(&["LoyaltyID"])
    .require(&["LoyaltyID", "CustomerID"])
}

/// Keyed on the account and the moment of the points change.
pub fn loyalty_transactions() -> CleaningRule {
    CleaningRule::new(
        LOYALTY_TRANSACTIONS,
        TableSchema::new()
            .integer("LoyaltyID")
            .text("DateTime")
            .integer("PointsChange")
            .text("Reason"),
    )
    .dedup_on(&["LoyaltyID", "DateTime"])
    .require(&["LoyaltyID", "DateTime"])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_catalog_rule_is_valid() {
        for rule in default_rules() {
            rule.validate()
                .unwrap_or_else(|e| panic!("rule for {} is invalid: {e}", rule.table));
        }
    }

    #[test]
    fn catalog_covers_every_source_table() {
        let tables: Vec<String> = default_rules().into_iter().map(|r| r.table).collect();
        assert_eq!(tables, source_tables());
    }

    #[test]
    fn transaction_tables_coerce_amounts() {
        assert_eq!(online_transactions().currency, vec!["Amount"]);
        assert_eq!(in_store_transactions().currency, vec!["Amount"]);
        assert_eq!(products().currency, vec!["Price"]);
        assert!(customers().currency.is_empty());
    }

    #[test]
    fn loyalty_transactions_use_composite_key() {
        assert_eq!(loyalty_transactions().dedup_key, vec!["LoyaltyID", "DateTime"]);
    }
}
