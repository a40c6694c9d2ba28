use crate::aggregations::types::AggregationType;

impl AggregationType {
    pub fn count() -> AggregationType {
        AggregationType::Count
    }

    pub fn min(field: impl Into<String>) -> AggregationType {
        AggregationType::Min {
            field: field.into(),
        }
    }

    pub fn max(field: impl Into<String>) -> AggregationType {
        AggregationType::Max {
            field: field.into(),
        }
    }

    pub fn sum(field: impl Into<String>) -> AggregationType {
        AggregationType::Sum {
            field: field.into(),
        }
    }

    pub fn avg(field: impl Into<String>) -> AggregationType {
        AggregationType::Avg {
            field: field.into(),
        }
    }

    pub fn stats(field: impl Into<String>) -> AggregationType {
        AggregationType::Stats {
            field: field.into(),
        }
    }

    pub fn terms(field: impl Into<String>) -> AggregationType {
        AggregationType::Terms {
            field: field.into(),
            size: Some(10),
        }
    }

    pub fn terms_with_size(field: impl Into<String>, size: usize) -> AggregationType {
        AggregationType::Terms {
            field: field.into(),
            size: Some(size),
        }
    }
}
