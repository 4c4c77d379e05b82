use thiserror::Error;

pub type AuditResult<T, E = AuditError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum AuditError {
  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),

  #[error("config error: {0}")]
  Toml(#[from] toml::de::Error),

  #[error("tree-sitter error: {0}")]
  TreeSitter(#[from] tree_sitter::LanguageError),

  /// The rule set failed validation; no scan may start with it.
  #[error("invalid rule set: {0}")]
  Config(String),

  /// The parser produced a tree with syntax errors.
  #[error("syntax error at {line}:{col}")]
  Parse { line: usize, col: usize },

  /// The tree handed to the registry cannot be scanned.
  #[error("input error: {0}")]
  Input(String),

  #[error("other: {0}")]
  Other(String),
}

impl AuditError {
  pub(crate) fn config(msg: impl Into<String>) -> Self {
    AuditError::Config(msg.into())
  }
}
