// Application layer - Report generation use cases
pub mod dashboard_repository;
pub mod document;
pub mod panel_renderer;
pub mod report;

#[cfg(test)]
pub mod test_support;
