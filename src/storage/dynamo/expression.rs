//! Condition and key-condition expressions.
//!
//! Attribute names always go through `#` placeholders.

use std::collections::HashMap;

use aws_sdk_dynamodb::types::AttributeValue;

use crate::storage::schema::{ATTR_LAST_MODIFIED, ATTR_PK};
use crate::storage::table::{Condition, Query, SortCondition};

/// An expression with its placeholder bindings.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct Expression {
    pub text: String,
    pub names: HashMap<String, String>,
    pub values: HashMap<String, AttributeValue>,
}

impl Expression {
    /// Values map for the request; DynamoDB rejects an empty one.
    pub fn values(&self) -> Option<HashMap<String, AttributeValue>> {
        if self.values.is_empty() {
            None
        } else {
            Some(self.values.clone())
        }
    }
}

pub(super) fn condition(condition: &Condition) -> Expression {
    match condition {
        Condition::NotExists => Expression {
            text: "attribute_not_exists(#pk)".to_string(),
            names: HashMap::from([("#pk".to_string(), ATTR_PK.to_string())]),
            values: HashMap::new(),
        },
        Condition::ExistsNotNewerThan(stamp) => Expression {
            text: "attribute_exists(#pk) AND #lm <= :stamp".to_string(),
            names: HashMap::from([
                ("#pk".to_string(), ATTR_PK.to_string()),
                ("#lm".to_string(), ATTR_LAST_MODIFIED.to_string()),
            ]),
            values: HashMap::from([(":stamp".to_string(), AttributeValue::S(stamp.clone()))]),
        },
    }
}

pub(super) fn key_condition(query: &Query) -> Expression {
    let mut names = HashMap::from([(
        "#part".to_string(),
        query.index.partition_attr().to_string(),
    )]);
    let mut values = HashMap::from([(
        ":part".to_string(),
        AttributeValue::S(query.partition.clone()),
    )]);

    let text = match &query.sort {
        None => "#part = :part".to_string(),
        Some(SortCondition::BeginsWith(prefix)) => {
            names.insert("#sort".to_string(), query.index.sort_attr().to_string());
            values.insert(":prefix".to_string(), AttributeValue::S(prefix.clone()));
            "#part = :part AND begins_with(#sort, :prefix)".to_string()
        }
    };

    Expression {
        text,
        names,
        values,
    }
}
