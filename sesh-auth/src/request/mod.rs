//! Authentication _request_ mechanics.

use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use sesh::{service::Request, side::Side, trans::DisconnectReason, Packet, Pipe, Quirks, Session};
use ssh_packet::arch::{Ascii, Utf8 as StringUtf8};

use crate::{
    signature,
    userauth::{self, InfoRequest, InfoResponse, Method, PasswdChangereq, PkOk},
    Diagnostic, Error, Methods, Result,
};

mod prompter;
pub use prompter::Prompter;

#[doc(no_inline)]
pub use ssh_key::PrivateKey;

/// The maximum count of `keyboard-interactive` challenges answered in a single attempt.
pub const MAX_ROUNDS: usize = 5;

enum Outcome {
    Success,
    Failure { names: Vec<String> },
}

impl Outcome {
    fn from_packet(packet: &Packet) -> sesh::Result<Self> {
        if packet.is::<userauth::Success>() {
            return Ok(Self::Success);
        }

        let userauth::Failure {
            continue_with,
            partial_success,
        } = packet.to()?;

        let names = continue_with
            .into_iter()
            .map(|name| name.to_string())
            .collect::<Vec<_>>();

        if *partial_success {
            tracing::debug!("Partial success, the server continues with {names:?}");
        }

        Ok(Self::Failure { names })
    }
}

/// The authentication service [`Request`] for sessions.
///
/// # Note
/// 1. The service always starts with the `none` method,
///    to discover the methods available on the server.
/// 2. Keys are attempted in the order they were provided, before the password.
pub struct Auth<R> {
    username: String,
    service: R,

    password: Option<SecretString>,
    keys: Vec<PrivateKey>,
    prompter: Option<Box<dyn Prompter>>,
}

impl<R> fmt::Debug for Auth<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Auth")
            .field("username", &self.username)
            .field("password", &self.password)
            .field(
                "keys",
                &self
                    .keys
                    .iter()
                    .map(|key| key.fingerprint(ssh_key::HashAlg::Sha256))
                    .collect::<Vec<_>>(),
            )
            .field("prompter", &self.prompter.as_ref().map(|_| ".."))
            .finish_non_exhaustive()
    }
}

impl<R: Request> Auth<R> {
    /// Create an [`Auth`] service for the provided _username_, to access the provided _service_.
    pub fn new(username: impl Into<String>, service: R) -> Self {
        Self {
            username: username.into(),
            service,

            password: None,
            keys: Vec::new(),
            prompter: None,
        }
    }

    /// Attempt to authenticate with the `password` method,
    /// or answer `keyboard-interactive` password prompts with it.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(SecretString::from(password.into()));

        self
    }

    /// Attempt to authenticate with the `publickey` method.
    ///
    /// RSA keys authenticate with `rsa-sha2-512` signatures.
    pub fn publickey(mut self, key: impl Into<PrivateKey>) -> Self {
        self.keys.push(key.into());

        self
    }

    /// Answer the `keyboard-interactive` challenges with a [`Prompter`].
    pub fn prompter(mut self, prompter: impl Prompter + 'static) -> Self {
        self.prompter = Some(Box::new(prompter));

        self
    }

    fn request<'m>(&'m self, method: Method<'m>) -> userauth::Request<'m> {
        userauth::Request {
            username: self.username.as_str().into(),
            service_name: Ascii::borrowed_unchecked(R::SERVICE_NAME),
            method,
        }
    }

    fn failed(&self, diagnostic: Diagnostic) -> Error {
        Error::Failed {
            user: self.username.clone(),
            diagnostic,
        }
    }

    /// Pick the next method to attempt among the offered ones, from the credentials left.
    fn next(&self, offered: Methods, tried: Methods, key: usize, quirks: Quirks) -> Option<Methods> {
        let untried = offered.difference(tried);
        let interactive = untried.contains(Methods::KEYBOARD_INTERACTIVE)
            && (self.password.is_some() || self.prompter.is_some());

        if offered.contains(Methods::PUBLICKEY) && key < self.keys.len() {
            Some(Methods::PUBLICKEY)
        } else if interactive && quirks.contains(Quirks::INTERACTIVE_PASSWORD) {
            Some(Methods::KEYBOARD_INTERACTIVE)
        } else if untried.contains(Methods::PASSWORD) && self.password.is_some() {
            Some(Methods::PASSWORD)
        } else if interactive {
            Some(Methods::KEYBOARD_INTERACTIVE)
        } else {
            None
        }
    }

    /// Explain why none of the methods of the server's `names` list could succeed.
    fn diagnose(&self, names: &[String], last: Option<Methods>) -> Diagnostic {
        let offered = Methods::from_names(names);
        let secret = Methods::PASSWORD | Methods::KEYBOARD_INTERACTIVE;

        if names.is_empty() {
            Diagnostic::UnknownUser
        } else if let Some(method) = last.filter(|method| offered.contains(*method)) {
            Diagnostic::Rejected {
                method: method.name().unwrap_or("none"),
            }
        } else if offered.intersects(secret) && self.password.is_none() && !self.keys.is_empty() {
            Diagnostic::MissingPassword
        } else if offered.contains(Methods::PUBLICKEY)
            && self.keys.is_empty()
            && self.password.is_some()
        {
            Diagnostic::MissingKey
        } else {
            Diagnostic::NoUsableMethod {
                offered: names.to_vec(),
            }
        }
    }

    async fn authenticate<IO: Pipe, S: Side>(&mut self, session: &mut Session<IO, S>) -> Result<()> {
        let mut tried = Methods::NONE;
        let mut last = None;
        let mut key = 0;
        let mut retried = false;

        let mut outcome = self.none(session).await?;

        loop {
            let names = match outcome {
                Outcome::Success => break Ok(()),
                Outcome::Failure { names } => names,
            };

            if names.is_empty() && !retried {
                tracing::debug!("Server sent an empty method list, retrying with `none`");

                retried = true;
                outcome = self.none(session).await?;

                continue;
            }

            let offered = Methods::from_names(&names);
            let Some(method) = self.next(offered, tried, key, session.quirks()) else {
                let diagnostic = self.diagnose(&names, last);

                give_up(
                    session,
                    DisconnectReason::NoMoreAuthMethodsAvailable,
                    diagnostic.to_string(),
                )
                .await;

                break Err(self.failed(diagnostic));
            };

            tracing::debug!(
                "Attempting method `{}` for user `{}`",
                method.name().unwrap_or_default(),
                self.username
            );

            tried |= method;
            last = Some(method);

            outcome = if method == Methods::PUBLICKEY {
                key += 1;

                self.publickey_attempt(session, key - 1).await?
            } else if method == Methods::PASSWORD {
                self.password_attempt(session).await?
            } else {
                self.interactive_attempt(session).await?
            };
        }
    }

    async fn none<IO: Pipe, S: Side>(&self, session: &mut Session<IO, S>) -> Result<Outcome> {
        session.send(&self.request(Method::None)).await?;

        Ok(Outcome::from_packet(&session.recv().await?)?)
    }

    async fn publickey_attempt<IO: Pipe, S: Side>(
        &self,
        session: &mut Session<IO, S>,
        index: usize,
    ) -> Result<Outcome> {
        let Some(key) = self.keys.get(index) else {
            return Err(self.failed(Diagnostic::MissingKey));
        };

        let algorithm = signature::algorithm(key);
        let blob = key.public_key().to_bytes().map_err(sesh::Error::from)?;

        // Query the server for the key acceptability, before signing.
        session
            .send(&self.request(Method::Publickey {
                algorithm: algorithm.as_str().as_bytes().into(),
                blob: blob.as_slice().into(),
                signature: None,
            }))
            .await?;

        let response = session.recv().await?;
        if !response.is::<PkOk>() {
            return Ok(Outcome::from_packet(&response)?);
        }

        let PkOk {
            algorithm: accepted,
            ..
        } = response.to()?;
        if &*accepted != algorithm.as_str().as_bytes() {
            tracing::debug!("Server acknowledged a different algorithm than `{algorithm}`");
        }

        let data = signature::Data {
            session_id: session.session_id().unwrap_or_default().into(),
            username: self.username.as_str().into(),
            service_name: R::SERVICE_NAME.into(),
            algorithm: algorithm.as_str().as_bytes().into(),
            blob: blob.as_slice().into(),
        }
        .to_bytes()?;
        let signature = signature::sign(
            key,
            &data,
            session.quirks().contains(Quirks::PAD_RSA_SIGNATURE),
        )?;

        session
            .send(&self.request(Method::Publickey {
                algorithm: algorithm.as_str().as_bytes().into(),
                blob: blob.as_slice().into(),
                signature: Some(signature.into()),
            }))
            .await?;

        Ok(Outcome::from_packet(&session.recv().await?)?)
    }

    async fn password_attempt<IO: Pipe, S: Side>(
        &self,
        session: &mut Session<IO, S>,
    ) -> Result<Outcome> {
        let Some(password) = &self.password else {
            return Err(self.failed(Diagnostic::MissingPassword));
        };

        session
            .send(&self.request(Method::Password {
                password: password.expose_secret().into(),
                new: None,
            }))
            .await?;

        let response = session.recv().await?;
        if response.is::<PasswdChangereq>() {
            let PasswdChangereq { prompt, .. } = response.to()?;

            give_up(
                session,
                DisconnectReason::AuthCancelledByUser,
                "Password change is not supported",
            )
            .await;

            return Err(Error::PasswordExpired {
                user: self.username.clone(),
                prompt: prompt.to_string(),
            });
        }

        Ok(Outcome::from_packet(&response)?)
    }

    async fn interactive_attempt<IO: Pipe, S: Side>(
        &mut self,
        session: &mut Session<IO, S>,
    ) -> Result<Outcome> {
        session
            .send(&self.request(Method::KeyboardInteractive {
                language: Ascii::default(),
                submethods: StringUtf8::default(),
            }))
            .await?;

        let mut rounds = 0;

        loop {
            let response = session.recv().await?;
            if !response.is::<InfoRequest>() {
                break Ok(Outcome::from_packet(&response)?);
            }

            rounds += 1;
            if rounds > MAX_ROUNDS {
                break Err(sesh::Error::Overflow {
                    what: "keyboard-interactive challenges",
                    limit: MAX_ROUNDS,
                }
                .into());
            }

            let request = response.to::<InfoRequest>()?;
            tracing::debug!(
                "Challenge {rounds} `{}` with {} prompts",
                request.name,
                request.prompts.len()
            );

            let responses = self.respond(&request);
            session.send(&InfoResponse { responses }).await?;
        }
    }

    /// Answer the challenge with the [`Prompter`] or, lacking one, the password.
    fn respond(&mut self, request: &InfoRequest) -> Vec<SecretString> {
        if let Some(prompter) = self.prompter.as_mut() {
            return prompter
                .respond(request)
                .into_iter()
                .map(SecretString::from)
                .collect();
        }

        request
            .prompts
            .iter()
            .map(|prompt| match &self.password {
                Some(password) if prompt.is_password() => {
                    SecretString::from(password.expose_secret().to_owned())
                }
                _ => SecretString::from(String::new()),
            })
            .collect()
    }
}

/// Disconnect from the peer, the session being unusable after a failed authentication.
async fn give_up<IO: Pipe, S: Side>(
    session: &mut Session<IO, S>,
    reason: DisconnectReason,
    description: impl Into<String>,
) {
    if let Err(err) = session.disconnect(reason, description).await {
        tracing::debug!("Unable to notify the peer of the authentication failure: {err}");
    }
}

impl<R> Request for Auth<R>
where
    R: Request,
    R::Err: From<Error>,
{
    type Err = R::Err;
    type Ok<IO: Pipe, S: Side> = R::Ok<IO, S>;

    const SERVICE_NAME: &'static str = crate::SERVICE_NAME;

    async fn on_accept<IO, S>(
        &mut self,
        mut session: Session<IO, S>,
    ) -> Result<Self::Ok<IO, S>, Self::Err>
    where
        IO: Pipe,
        S: Side,
    {
        match self.authenticate(&mut session).await {
            Ok(()) => {
                tracing::debug!(
                    "Authenticated as `{}` for service `{}`",
                    self.username,
                    R::SERVICE_NAME
                );

                session.mark_established();
                self.service.on_accept(session).await
            }
            Err(Error::Session(err)) => Err(Error::Session(session.abort(err).await).into()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use rstest::rstest;

    use super::*;

    struct Nothing;

    impl Request for Nothing {
        type Err = Error;
        type Ok<IO: Pipe, S: Side> = ();

        const SERVICE_NAME: &'static str = "ssh-connection";

        async fn on_accept<IO, S>(&mut self, _: Session<IO, S>) -> Result<Self::Ok<IO, S>>
        where
            IO: Pipe,
            S: Side,
        {
            Ok(())
        }
    }

    fn key() -> PrivateKey {
        PrivateKey::random(&mut rand::thread_rng(), ssh_key::Algorithm::Ed25519).unwrap()
    }

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    #[rstest]
    #[case(&["password"], None, Diagnostic::MissingPassword)]
    #[case(&["keyboard-interactive"], None, Diagnostic::MissingPassword)]
    #[case(
        &["publickey", "password"],
        Some(Methods::PUBLICKEY),
        Diagnostic::Rejected { method: "publickey" }
    )]
    #[case(&[], Some(Methods::PUBLICKEY), Diagnostic::UnknownUser)]
    #[case(
        &["hostbased"],
        None,
        Diagnostic::NoUsableMethod { offered: vec!["hostbased".into()] }
    )]
    fn diagnose_with_key(
        #[case] offered: &[&str],
        #[case] last: Option<Methods>,
        #[case] diagnostic: Diagnostic,
    ) {
        let auth = Auth::new("user", Nothing).publickey(key());

        assert_eq!(auth.diagnose(&names(offered), last), diagnostic);
    }

    #[rstest]
    #[case(&["publickey"], None, Diagnostic::MissingKey)]
    #[case(
        &["publickey", "password"],
        Some(Methods::PASSWORD),
        Diagnostic::Rejected { method: "password" }
    )]
    fn diagnose_with_password(
        #[case] offered: &[&str],
        #[case] last: Option<Methods>,
        #[case] diagnostic: Diagnostic,
    ) {
        let auth = Auth::new("user", Nothing).password("hunter2");

        assert_eq!(auth.diagnose(&names(offered), last), diagnostic);
    }

    #[rstest]
    #[case(&["gssapi-with-mic"])]
    #[case(&["gssapi-with-mic", "gssapi-keyex"])]
    fn unknown_methods_are_not_an_unknown_user(#[case] offered: &[&str]) {
        let auth = Auth::new("user", Nothing).password("hunter2");

        assert_eq!(
            auth.diagnose(&names(offered), Some(Methods::NONE)),
            Diagnostic::NoUsableMethod {
                offered: names(offered)
            }
        );
    }

    #[test]
    fn method_order() {
        let auth = Auth::new("user", Nothing).password("hunter2").publickey(key());
        let offered = Methods::PUBLICKEY | Methods::PASSWORD | Methods::KEYBOARD_INTERACTIVE;

        assert_eq!(
            auth.next(offered, Methods::NONE, 0, Quirks::empty()),
            Some(Methods::PUBLICKEY)
        );
        assert_eq!(
            auth.next(offered, Methods::NONE | Methods::PUBLICKEY, 1, Quirks::empty()),
            Some(Methods::PASSWORD)
        );
        assert_eq!(
            auth.next(offered, Methods::NONE | Methods::PUBLICKEY, 1, Quirks::INTERACTIVE_PASSWORD),
            Some(Methods::KEYBOARD_INTERACTIVE)
        );
        assert_eq!(auth.next(offered, offered, 1, Quirks::empty()), None);
    }

    #[test]
    fn password_answers_prompts() {
        let mut auth = Auth::new("user", Nothing).password("hunter2");

        let responses = auth.respond(&InfoRequest {
            name: String::new(),
            instruction: String::new(),
            language: String::new(),
            prompts: vec![
                userauth::Prompt {
                    prompt: "Password: ".into(),
                    echo: false,
                },
                userauth::Prompt {
                    prompt: "Token: ".into(),
                    echo: true,
                },
            ],
        });

        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].expose_secret(), "hunter2");
        assert_eq!(responses[1].expose_secret(), "");
    }
}
