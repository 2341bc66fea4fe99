// Testing harness - fixtures for tests and demos
//
// Deterministic synthetic motor recordings that drive the full pipeline
// without real audio on disk.

pub mod synthetic;
