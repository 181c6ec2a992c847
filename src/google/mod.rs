//! Google API clients.
//!
//! - credentials — on-disk OAuth credential store and token refresh
//! - gmail — MFA verification codes and alert mail
//! - sheets — finances and expenses spreadsheet writes

pub mod credentials;
pub mod gmail;
pub mod sheets;
