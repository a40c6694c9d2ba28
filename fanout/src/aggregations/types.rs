use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationRequest {
    pub name: String,
    #[serde(flatten)]
    pub agg_type: AggregationType,
}

impl AggregationRequest {
    pub fn new(name: impl Into<String>, agg_type: AggregationType) -> Self {
        Self {
            name: name.into(),
            agg_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AggregationType {
    Count,
    Min {
        field: String,
    },
    Max {
        field: String,
    },
    Sum {
        field: String,
    },
    Avg {
        field: String,
    },
    Stats {
        field: String,
    },
    Terms {
        field: String,
        size: Option<usize>,
    },
}

impl AggregationType {
    pub fn field(&self) -> Option<&str> {
        match self {
            AggregationType::Count => None,
            AggregationType::Min { field }
            | AggregationType::Max { field }
            | AggregationType::Sum { field }
            | AggregationType::Avg { field }
            | AggregationType::Stats { field }
            | AggregationType::Terms { field, .. } => Some(field),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationResult {
    pub name: String,
    #[serde(flatten)]
    pub value: AggregationValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AggregationValue {
    Single {
        value: Option<f64>,
    },
    Stats(StatsResult),
    Buckets {
        buckets: Vec<Bucket>,
        sum_other_doc_count: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsResult {
    pub count: u64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub sum: Option<f64>,
    pub avg: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub key: String,
    pub doc_count: u64,
}
