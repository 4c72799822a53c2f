use thiserror::Error;

/// Keywords that reject a query wherever they appear, even inside an allowed statement.
pub const RESTRICTED_SQL_KEYWORDS: &[&str] = &[
    "DROP", "DELETE", "UPDATE", "INSERT", "ALTER", "TRUNCATE", "REPLACE", "ATTACH", "DETACH",
    "PRAGMA",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SqlGateRejection {
    #[error("empty SQL statement")]
    Empty,
    #[error("SQL operation not permitted")]
    OperationNotPermitted,
    #[error("SQL contains a restricted keyword: {0}")]
    RestrictedKeyword(&'static str),
}

/// Heuristic read-only check for model-authored SQL.
///
/// Matching is substring based over the trimmed, upper-cased text. It does not
/// parse SQL, so the storage layer also runs these statements on a query-only
/// connection.
#[derive(Debug, Clone)]
pub struct SqlGate {
    allowed_leading: Vec<String>,
}

impl SqlGate {
    pub fn new<I, S>(allowed_leading: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed_leading: allowed_leading
                .into_iter()
                .map(|op| op.as_ref().trim().to_ascii_uppercase())
                .filter(|op| !op.is_empty())
                .collect(),
        }
    }

    pub fn allowed_leading(&self) -> &[String] {
        &self.allowed_leading
    }

    pub fn check(&self, sql: &str) -> Result<(), SqlGateRejection> {
        let normalized = sql.trim().to_uppercase();
        if normalized.is_empty() {
            return Err(SqlGateRejection::Empty);
        }

        if !self
            .allowed_leading
            .iter()
            .any(|op| normalized.starts_with(op.as_str()))
        {
            return Err(SqlGateRejection::OperationNotPermitted);
        }

        if let Some(keyword) = RESTRICTED_SQL_KEYWORDS
            .iter()
            .find(|keyword| normalized.contains(*keyword))
        {
            return Err(SqlGateRejection::RestrictedKeyword(*keyword));
        }

        Ok(())
    }
}

impl Default for SqlGate {
    fn default() -> Self {
        Self::new(["SELECT", "WITH"])
    }
}
