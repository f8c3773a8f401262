//! Authentication _handling_ mechanics.

use secrecy::ExposeSecret;
use sesh::{
    service::Handler, side::Side, trans::DisconnectReason, Error, Pipe, Result, Session,
};
use ssh_key::PublicKey;
use ssh_packet::arch::NameList;

use crate::{
    request::MAX_ROUNDS,
    signature,
    userauth::{self, InfoRequest, InfoResponse, Method},
    Methods,
};

pub mod keyboard;
pub mod none;
pub mod password;
pub mod publickey;

/// The maximum count of authentication attempts before disconnecting the peer.
pub const MAX_ATTEMPTS: usize = 20;

#[derive(Debug, PartialEq)]
enum Attempt {
    Success,
    Failure,
    Continue,
}

/// The authentication service [`Handler`] for sessions.
#[derive(Debug)]
pub struct Auth<H, N = (), P = (), PK = (), KI = ()> {
    banner: Option<String>,
    methods: Methods,
    attempts: usize,

    handler: H,

    none: N,
    password: P,
    publickey: PK,
    keyboard: KI,
}

impl<H> Auth<H>
where
    H: Handler,
{
    /// Create an [`Auth`] service, rejecting all authentication by default.
    pub fn new(service: H) -> Self {
        Self {
            banner: Default::default(),
            methods: Methods::NONE,
            attempts: 0,

            handler: service,

            none: (),
            password: (),
            publickey: (),
            keyboard: (),
        }
    }
}

impl<H, N, P, PK, KI> Auth<H, N, P, PK, KI>
where
    H: Handler,
    N: none::None,
    P: password::Password,
    PK: publickey::Publickey,
    KI: keyboard::KeyboardInteractive,
{
    /// Set the authentication banner text to be displayed upon authentication (the string should be `\r\n` terminated).
    pub fn banner(mut self, banner: impl Into<String>) -> Self {
        self.banner = Some(banner.into());

        self
    }

    /// Set the authentication handler for the `none` method.
    pub fn none(self, none: impl none::None) -> Auth<H, impl none::None, P, PK, KI> {
        let Self {
            banner,
            methods,
            attempts,
            handler,
            none: _,
            password,
            publickey,
            keyboard,
        } = self;

        Auth {
            banner,
            methods,
            attempts,
            handler,
            none,
            password,
            publickey,
            keyboard,
        }
    }

    /// Set the authentication handler for the `password` method.
    pub fn password(
        self,
        password: impl password::Password,
    ) -> Auth<H, N, impl password::Password, PK, KI> {
        let Self {
            banner,
            methods,
            attempts,
            handler,
            none,
            password: _,
            publickey,
            keyboard,
        } = self;

        Auth {
            banner,
            methods: methods | Methods::PASSWORD,
            attempts,
            handler,
            none,
            password,
            publickey,
            keyboard,
        }
    }

    /// Set the authentication handler for the `publickey` method.
    pub fn publickey(
        self,
        publickey: impl publickey::Publickey,
    ) -> Auth<H, N, P, impl publickey::Publickey, KI> {
        let Self {
            banner,
            methods,
            attempts,
            handler,
            none,
            password,
            publickey: _,
            keyboard,
        } = self;

        Auth {
            banner,
            methods: methods | Methods::PUBLICKEY,
            attempts,
            handler,
            none,
            password,
            publickey,
            keyboard,
        }
    }

    /// Set the authentication handler for the `keyboard-interactive` method.
    pub fn keyboard_interactive(
        self,
        keyboard: impl keyboard::KeyboardInteractive,
    ) -> Auth<H, N, P, PK, impl keyboard::KeyboardInteractive> {
        let Self {
            banner,
            methods,
            attempts,
            handler,
            none,
            password,
            publickey,
            keyboard: _,
        } = self;

        Auth {
            banner,
            methods: methods | Methods::KEYBOARD_INTERACTIVE,
            attempts,
            handler,
            none,
            password,
            publickey,
            keyboard,
        }
    }

    /// The methods that can continue, `none` being implicit.
    fn continue_with(&self) -> NameList<'static> {
        NameList::from_iter(self.methods.difference(Methods::NONE).names())
    }

    async fn handle_attempt<IO: Pipe, S: Side>(
        &mut self,
        session: &mut Session<IO, S>,
        username: String,
        service_name: &str,
        method: Method<'_>,
    ) -> Result<Attempt> {
        let kind = Methods::from(&method);

        if !self.methods.contains(kind) {
            tracing::debug!(
                "Attempt using disabled method `{}` for user `{username}`",
                kind.name().unwrap_or_default()
            );

            return Ok(Attempt::Failure);
        }

        Ok(match method {
            Method::None => {
                tracing::debug!("Attempt using method `none` for user `{username}`");

                match self.none.process(username) {
                    none::Response::Accept => Attempt::Success,
                    none::Response::Reject => Attempt::Failure,
                }
            }

            Method::Publickey {
                algorithm,
                blob,
                signature,
            } => {
                tracing::debug!(
                    "Attempt using method `publickey` (signed: {}, algorithm: {}) for user `{username}`",
                    signature.is_some(),
                    String::from_utf8_lossy(&algorithm),
                );

                let Some(key) = PublicKey::from_bytes(&blob)
                    .ok()
                    .filter(|key| signature::is_compatible(&key.algorithm(), &algorithm))
                else {
                    return Ok(Attempt::Failure);
                };

                match signature {
                    None => match self.publickey.process(username, key) {
                        publickey::Response::Accept => {
                            session.send(&userauth::PkOk { algorithm, blob }).await?;

                            Attempt::Continue
                        }
                        publickey::Response::Reject => Attempt::Failure,
                    },
                    Some(signature) => {
                        let data = signature::Data {
                            session_id: session.session_id().unwrap_or_default().into(),
                            username: username.as_str().into(),
                            service_name: service_name.into(),
                            algorithm: (&*algorithm).into(),
                            blob: (&*blob).into(),
                        }
                        .to_bytes()?;

                        if signature::verify(&key, &algorithm, &data, &signature)
                            && self.publickey.process(username, key) == publickey::Response::Accept
                        {
                            Attempt::Success
                        } else {
                            Attempt::Failure
                        }
                    }
                }
            }

            Method::Password { password, new } => {
                tracing::debug!(
                    "Attempt using method `password` (update: {}) for user `{username}`",
                    new.is_some(),
                );

                match self.password.process(
                    username,
                    password.to_string(),
                    new.map(|new| new.to_string()),
                ) {
                    password::Response::Accept => Attempt::Success,
                    password::Response::PasswordExpired { prompt } => {
                        session
                            .send(&userauth::PasswdChangereq {
                                prompt: prompt.into(),
                                language: Default::default(),
                            })
                            .await?;

                        Attempt::Continue
                    }
                    password::Response::Reject => Attempt::Failure,
                }
            }

            Method::KeyboardInteractive { .. } => {
                tracing::debug!("Attempt using method `keyboard-interactive` for user `{username}`");

                let mut responses = None;

                for _ in 0..MAX_ROUNDS {
                    match self.keyboard.process(username.clone(), responses.take()) {
                        keyboard::Response::Accept => return Ok(Attempt::Success),
                        keyboard::Response::Reject => return Ok(Attempt::Failure),
                        keyboard::Response::Challenge {
                            name,
                            instruction,
                            prompts,
                        } => {
                            session
                                .send(&InfoRequest {
                                    name,
                                    instruction,
                                    language: String::new(),
                                    prompts,
                                })
                                .await?;

                            let InfoResponse { responses: answers } = session.recv().await?.to()?;

                            responses = Some(
                                answers
                                    .iter()
                                    .map(|answer| answer.expose_secret().to_owned())
                                    .collect(),
                            );
                        }
                    }
                }

                tracing::warn!("Too many challenges for user `{username}`, rejecting");

                Attempt::Failure
            }

            Method::Hostbased { .. } => Attempt::Failure,
        })
    }
}

impl<H, N, P, PK, KI> Handler for Auth<H, N, P, PK, KI>
where
    H: Handler,
    N: none::None,
    P: password::Password,
    PK: publickey::Publickey,
    KI: keyboard::KeyboardInteractive,
{
    type Err = H::Err;
    type Ok<IO: Pipe, S: Side> = H::Ok<IO, S>;

    const SERVICE_NAME: &'static str = crate::SERVICE_NAME;

    async fn on_request<IO, S>(
        &mut self,
        mut session: Session<IO, S>,
    ) -> Result<Self::Ok<IO, S>, Self::Err>
    where
        IO: Pipe,
        S: Side,
    {
        if let Some(message) = self.banner.take() {
            session
                .send(&userauth::Banner {
                    message: message.into(),
                    language: Default::default(),
                })
                .await?;
        }

        loop {
            let packet = session.recv().await?;

            // Unknown methods fail to decode, they are rejected like any other.
            let request = match packet.to::<userauth::Request>() {
                Ok(request) => Some(request),
                Err(Error::Parse { .. }) if packet.is::<userauth::Request>() => None,
                Err(err) => break Err(session.abort(err).await.into()),
            };

            if !matches!(
                request,
                Some(userauth::Request {
                    method: Method::Publickey {
                        signature: None,
                        ..
                    },
                    ..
                })
            ) {
                self.attempts += 1;
            }

            if self.attempts > MAX_ATTEMPTS {
                tracing::warn!("Too many authentication attempts, disconnecting");

                session
                    .disconnect(
                        DisconnectReason::NoMoreAuthMethodsAvailable,
                        "Too many authentication attempts",
                    )
                    .await?;

                break Err(Error::Overflow {
                    what: "authentication attempts",
                    limit: MAX_ATTEMPTS,
                }
                .into());
            }

            let Some(userauth::Request {
                username,
                service_name,
                method,
            }) = request
            else {
                tracing::debug!("Attempt using an unsupported method");

                session
                    .send(&userauth::Failure {
                        continue_with: self.continue_with(),
                        partial_success: false.into(),
                    })
                    .await?;

                continue;
            };
            let username = username.to_string();

            let attempt = self
                .handle_attempt(&mut session, username.clone(), &service_name, method)
                .await;

            match attempt {
                Ok(Attempt::Success) => {
                    if &*service_name != H::SERVICE_NAME {
                        break Err(session
                            .abort(Error::UnknownService {
                                expected: H::SERVICE_NAME,
                                got: service_name.to_string(),
                            })
                            .await
                            .into());
                    }

                    tracing::debug!(
                        "User `{username}` authenticated for service `{}`",
                        &*service_name
                    );

                    session.send(&userauth::Success).await?;
                    session.mark_established();

                    break self.handler.on_request(session).await;
                }
                Ok(Attempt::Failure) => {
                    session
                        .send(&userauth::Failure {
                            continue_with: self.continue_with(),
                            partial_success: false.into(),
                        })
                        .await?;
                }
                Ok(Attempt::Continue) => (),
                Err(err) => break Err(session.abort(err).await.into()),
            }
        }
    }
}
