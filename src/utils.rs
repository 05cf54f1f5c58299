use serde::{Deserialize, Serialize};

use crate::config::Config;

/// One page of a newest-first listing. `page` is 1-based.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
  pub items: Vec<T>,
  pub page: u64,
  pub per_page: u64,
  pub total: u64,
}

impl<T> Page<T> {
  pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
    Page {
      items: self.items.into_iter().map(f).collect(),
      page: self.page,
      per_page: self.per_page,
      total: self.total,
    }
  }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
  pub page: Option<u64>,
  pub per_page: Option<u64>,
}

impl PageQuery {
  pub fn new(page: u64, per_page: u64) -> Self {
    Self { page: Some(page), per_page: Some(per_page) }
  }

  /// Resolves to a 1-based page and a page size within the configured cap.
  pub fn resolve(self, config: &Config) -> (u64, u64) {
    let page = self.page.unwrap_or(1).max(1);
    let per_page = self
      .per_page
      .unwrap_or(config.ledger_page_size)
      .clamp(1, config.ledger_max_page_size);
    (page, per_page)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn resolve_clamps_to_config() {
    let config = Config::default();
    assert_eq!(PageQuery::default().resolve(&config), (1, 20));
    assert_eq!(PageQuery::new(0, 0).resolve(&config), (1, 1));
    assert_eq!(PageQuery::new(3, 10_000).resolve(&config), (3, 100));
  }
}
