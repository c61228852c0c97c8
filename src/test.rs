//! Scenario tests that drive entire bulk write calls over a scripted connection.

mod mock;
