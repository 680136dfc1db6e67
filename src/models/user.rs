use serde::{Deserialize, Serialize};

/// JWT claims of an authenticated caller. `sub` is the owner identity stamped
/// on every payment the caller initiates.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}
