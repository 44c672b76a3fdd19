//! Tests for peer address canonicalization and routability.
