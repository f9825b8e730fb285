// src/lib.rs
// =============================================================================
// Library side of ygg-crawler. The binary in main.rs is a thin CLI on top.
//
// Modules:
// - overlay: the collaborator boundary (Overlay trait, bridge, replay)
// - crawl: the concurrent crawler and its helpers
// - report: the results document written at the end of a crawl
// =============================================================================

pub mod crawl;
pub mod overlay;
pub mod report;
