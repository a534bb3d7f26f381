//! API request handlers.

pub mod anomalies;
pub mod detect;
pub mod health;
pub mod metrics;
pub mod stream;

pub use anomalies::*;
pub use detect::*;
pub use health::*;
pub use metrics::*;
pub use stream::*;
