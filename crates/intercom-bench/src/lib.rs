//! Benchmarks for the Intercom call manager. See `benches/`.
