use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl LogQuery {
    pub const DEFAULT_LIMIT: i64 = 50;
    pub const MAX_LIMIT: i64 = 200;

    pub fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

#[derive(Debug, Serialize)]
pub struct SentEmail {
    pub id: Option<String>,
    pub to: String,
    pub attachments: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_query_is_clamped() {
        let q = LogQuery { limit: Some(10_000), offset: Some(-4) };
        assert_eq!(q.limit(), LogQuery::MAX_LIMIT);
        assert_eq!(q.offset(), 0);
        let q = LogQuery { limit: None, offset: None };
        assert_eq!(q.limit(), LogQuery::DEFAULT_LIMIT);
    }
}
