use crate::config::CachesConfig;

/// Current generation of partition names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNames {
  pub static_name: String,
  pub dynamic_name: String,
}

impl CacheNames {
  pub fn new(static_version: u32, dynamic_version: u32) -> Self {
    Self {
      static_name: format!("static-v{}", static_version),
      dynamic_name: format!("dynamic-v{}", dynamic_version),
    }
  }

  pub fn from_config(config: &CachesConfig) -> Self {
    Self::new(config.static_version, config.dynamic_version)
  }

  /// Whether `name` belongs to the current generation
  pub fn is_current(&self, name: &str) -> bool {
    name == self.static_name || name == self.dynamic_name
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_names_embed_versions() {
    let names = CacheNames::new(3, 2);
    assert_eq!(names.static_name, "static-v3");
    assert_eq!(names.dynamic_name, "dynamic-v2");
    assert!(names.is_current("dynamic-v2"));
    assert!(!names.is_current("static-v2"));
  }
}
