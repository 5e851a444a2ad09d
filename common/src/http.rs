use crate::errors::*;
pub use reqwest::{Client, RequestBuilder, StatusCode};
use std::time::Duration;

pub const USER_AGENT: &str = concat!("crossbuild/", env!("CARGO_PKG_VERSION"));

pub fn client() -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(30))
        .read_timeout(Duration::from_secs(60))
        .build()
        .map_err(Error::from)
}
