//! Integration tests: sign-in flow and the run pipeline against fakes.

mod fakes;
mod login_flow;
mod pipeline;
