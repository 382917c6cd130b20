//! End-to-end lifecycle tests; see `tests/`.
