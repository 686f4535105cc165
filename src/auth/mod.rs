pub mod jwt;
pub mod lockout;
pub mod password;
pub mod permissions;
