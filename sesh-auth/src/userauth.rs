//! Messages of the [`SSH-USERAUTH`] protocol.
//!
//! Message number 60 is shared between [`PkOk`], [`PasswdChangereq`] and [`InfoRequest`],
//! the right one has to be picked from the method being attempted.
//!
//! [`SSH-USERAUTH`]: https://datatracker.ietf.org/doc/html/rfc4252

use secrecy::{ExposeSecret, SecretString};
use ssh_packet::{arch::Utf8 as StringUtf8, binrw};

#[doc(no_inline)]
pub use ssh_packet::userauth::{
    Banner, Failure, Method, PasswdChangereq, PkOk, Request, Success,
};

/// A single prompt of an [`InfoRequest`].
#[binrw::binrw]
#[derive(Debug, Clone, PartialEq, Eq)]
#[brw(big)]
pub struct Prompt {
    /// The prompt text.
    #[br(map = |text: StringUtf8| text.to_string())]
    #[bw(map = |text: &String| StringUtf8::from(text.clone()))]
    pub prompt: String,

    /// Whether the response should be echoed back while typed.
    #[br(map = |echo: u8| echo != 0)]
    #[bw(map = |echo: &bool| u8::from(*echo))]
    pub echo: bool,
}

impl Prompt {
    /// Whether the prompt looks like it asks for the password.
    pub fn is_password(&self) -> bool {
        !self.echo && self.prompt.to_ascii_lowercase().contains("password")
    }
}

/// The `SSH_MSG_USERAUTH_INFO_REQUEST` message.
#[binrw::binrw]
#[derive(Debug, Clone, PartialEq, Eq)]
#[brw(big, magic = 60_u8)]
pub struct InfoRequest {
    /// The name of the challenge.
    #[br(map = |text: StringUtf8| text.to_string())]
    #[bw(map = |text: &String| StringUtf8::from(text.clone()))]
    pub name: String,

    /// The instructions for the user.
    #[br(map = |text: StringUtf8| text.to_string())]
    #[bw(map = |text: &String| StringUtf8::from(text.clone()))]
    pub instruction: String,

    /// The language tag.
    #[br(map = |text: StringUtf8| text.to_string())]
    #[bw(map = |text: &String| StringUtf8::from(text.clone()))]
    pub language: String,

    #[bw(calc = prompts.len() as u32)]
    num_prompts: u32,

    /// The prompts to answer.
    #[br(count = num_prompts)]
    pub prompts: Vec<Prompt>,
}

/// The `SSH_MSG_USERAUTH_INFO_RESPONSE` message.
#[binrw::binrw]
#[derive(Debug)]
#[brw(big, magic = 61_u8)]
pub struct InfoResponse {
    #[bw(calc = responses.len() as u32)]
    num_responses: u32,

    /// The responses, in the order of the prompts.
    #[br(count = num_responses, map = |responses: Vec<StringUtf8>| {
        responses.iter().map(|response| SecretString::from(response.to_string())).collect()
    })]
    #[bw(map = |responses: &Vec<SecretString>| {
        responses
            .iter()
            .map(|response| StringUtf8::from(response.expose_secret().to_owned()))
            .collect::<Vec<_>>()
    })]
    pub responses: Vec<SecretString>,
}
