// Authentication: password hashing, JWTs, one-time codes, request identity
// and Google sign-in.

pub mod extractor;
pub mod google;
pub mod otp;
pub mod password;
pub mod tokens;

pub use extractor::AuthUser;
pub use google::{GoogleOAuth, GoogleUserInfo};
pub use tokens::{Claims, TokenPair, TokenService, TokenType};
