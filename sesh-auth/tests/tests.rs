#![allow(clippy::unwrap_used)]

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use async_compat::{Compat, CompatExt};
use rstest::rstest;
use sesh::{
    side::{client::Client, server::Server},
    trans::{DisconnectReason, ServiceAccept, ServiceRequest},
    Error as SessionError, Id, Session, Stage,
};
use sesh_auth::{
    handler::{self, keyboard, none, password},
    request::{self, MAX_ROUNDS},
    userauth, Diagnostic, Error,
};
use ssh_key::{
    private::{KeypairData, RsaKeypair},
    Algorithm, PrivateKey,
};
use ssh_packet::arch::NameList;
use tokio::io::{BufStream, DuplexStream};

use cookie::Cookie;

type Duplex = Compat<BufStream<DuplexStream>>;

fn trace() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .ok();
}

fn key(algorithm: Algorithm) -> PrivateKey {
    match algorithm {
        Algorithm::Rsa { .. } => PrivateKey::new(
            KeypairData::from(RsaKeypair::random(&mut rand::thread_rng(), 2048).unwrap()),
            "",
        )
        .unwrap(),
        algorithm => PrivateKey::random(&mut rand::thread_rng(), algorithm).unwrap(),
    }
}

/// Run the handshake of both sides over an in-memory pipe.
async fn sessions() -> Result<(Session<Duplex, Client>, Session<Duplex, Server>), SessionError> {
    sessions_with(Server::default()).await
}

async fn sessions_with(
    server: Server,
) -> Result<(Session<Duplex, Client>, Session<Duplex, Server>), SessionError> {
    let duplex = tokio::io::duplex(sesh::stream::MAX_PACKET_SIZE * 16);

    let server = Server {
        keys: vec![key(Algorithm::Ed25519)],
        ..server
    };

    tokio::try_join!(
        Session::new(BufStream::new(duplex.0).compat(), Client::default()),
        Session::new(BufStream::new(duplex.1).compat(), server),
    )
}

/// Accept the authentication service on a bare server session.
async fn accept(server: &mut Session<Duplex, Server>) -> Result<(), SessionError> {
    let ServiceRequest { service_name } = server.recv().await?.to()?;
    assert_eq!(&*service_name, "ssh-userauth");

    server.send(&ServiceAccept { service_name }).await
}

/// Request the authentication service on a bare client session.
async fn start(client: &mut Session<Duplex, Client>) -> Result<(), SessionError> {
    client
        .send(&ServiceRequest {
            service_name: ssh_packet::arch::ascii!("ssh-userauth"),
        })
        .await?;

    let ServiceAccept { service_name } = client.recv().await?.to()?;
    assert_eq!(&*service_name, "ssh-userauth");

    Ok(())
}

fn failure(continue_with: &[&str]) -> userauth::Failure<'static> {
    userauth::Failure {
        continue_with: NameList::from_iter(continue_with),
        partial_success: false.into(),
    }
}

#[tokio::test]
async fn basic_none() -> Result<(), Box<dyn std::error::Error>> {
    trace();

    let (client, server) = sessions().await?;

    let cookie0 = Cookie::default();
    let cookie1 = Cookie::default();

    let (handled, requested) = tokio::try_join!(
        server.handle(handler::Auth::new(cookie0.clone()).none(|_: String| none::Response::Accept)),
        client.request(request::Auth::new("user", cookie1.clone())),
    )?;

    assert!(cookie0.is_flagged(), "Authentication handling did not succeed");
    assert!(cookie1.is_flagged(), "Authentication request did not succeed");
    assert_eq!(handled, Stage::Established);
    assert_eq!(requested, Stage::Established);

    Ok(())
}

#[tokio::test]
async fn password_with_banner() -> Result<(), Box<dyn std::error::Error>> {
    trace();

    let (client, server) = sessions().await?;

    let cookie0 = Cookie::default();
    let cookie1 = Cookie::default();

    tokio::try_join!(
        server.handle(
            handler::Auth::new(cookie0.clone())
                .banner("Welcome !\r\n")
                .password(|user: String, password: String, _: Option<String>| {
                    if user == "user" && password == "hunter2" {
                        password::Response::Accept
                    } else {
                        password::Response::Reject
                    }
                })
        ),
        client.request(request::Auth::new("user", cookie1.clone()).password("hunter2")),
    )?;

    assert!(cookie0.is_flagged());
    assert!(cookie1.is_flagged());

    Ok(())
}

#[rstest]
#[case(Algorithm::Ed25519)]
#[case(Algorithm::Ecdsa { curve: ssh_key::EcdsaCurve::NistP256 })]
#[case(Algorithm::Rsa { hash: None })]
#[tokio::test]
async fn publickey(#[case] algorithm: Algorithm) -> Result<(), Box<dyn std::error::Error>> {
    trace();

    let (client, server) = sessions().await?;

    let key = key(algorithm);
    let authorized = key.public_key().clone();

    let cookie0 = Cookie::default();
    let cookie1 = Cookie::default();

    tokio::try_join!(
        server.handle(handler::Auth::new(cookie0.clone()).publickey(
            move |_: String, key: handler::publickey::PublicKey| {
                if key.key_data() == authorized.key_data() {
                    handler::publickey::Response::Accept
                } else {
                    handler::publickey::Response::Reject
                }
            }
        )),
        client.request(request::Auth::new("user", cookie1.clone()).publickey(key)),
    )?;

    assert!(cookie0.is_flagged());
    assert!(cookie1.is_flagged());

    Ok(())
}

#[tokio::test]
async fn unauthorized_key_falls_back_to_password() -> Result<(), Box<dyn std::error::Error>> {
    trace();

    let (client, server) = sessions().await?;

    let cookie0 = Cookie::default();
    let cookie1 = Cookie::default();

    tokio::try_join!(
        server.handle(
            handler::Auth::new(cookie0.clone())
                .publickey(|_: String, _: handler::publickey::PublicKey| handler::publickey::Response::Reject)
                .password(|_: String, password: String, _: Option<String>| {
                    if password == "hunter2" {
                        password::Response::Accept
                    } else {
                        password::Response::Reject
                    }
                })
        ),
        client.request(
            request::Auth::new("user", cookie1.clone())
                .publickey(key(Algorithm::Ed25519))
                .password("hunter2")
        ),
    )?;

    assert!(cookie0.is_flagged());
    assert!(cookie1.is_flagged());

    Ok(())
}

#[tokio::test]
async fn keyboard_interactive_with_password() -> Result<(), Box<dyn std::error::Error>> {
    trace();

    let (client, server) = sessions().await?;

    let cookie0 = Cookie::default();
    let cookie1 = Cookie::default();

    tokio::try_join!(
        server.handle(handler::Auth::new(cookie0.clone()).keyboard_interactive(
            |_: String, responses: Option<Vec<String>>| match responses {
                None => keyboard::Response::Challenge {
                    name: "Login".into(),
                    instruction: String::new(),
                    prompts: vec![keyboard::Prompt {
                        prompt: "Password: ".into(),
                        echo: false,
                    }],
                },
                Some(responses) if responses == ["hunter2"] => keyboard::Response::Accept,
                Some(_) => keyboard::Response::Reject,
            }
        )),
        client.request(request::Auth::new("user", cookie1.clone()).password("hunter2")),
    )?;

    assert!(cookie0.is_flagged());
    assert!(cookie1.is_flagged());

    Ok(())
}

#[tokio::test]
async fn keyboard_interactive_with_prompter() -> Result<(), Box<dyn std::error::Error>> {
    trace();

    let (client, server) = sessions().await?;

    let cookie0 = Cookie::default();
    let cookie1 = Cookie::default();

    tokio::try_join!(
        server.handle(handler::Auth::new(cookie0.clone()).keyboard_interactive(
            |_: String, responses: Option<Vec<String>>| match responses {
                None => keyboard::Response::Challenge {
                    name: String::new(),
                    instruction: "Second factor".into(),
                    prompts: vec![keyboard::Prompt {
                        prompt: "Token: ".into(),
                        echo: true,
                    }],
                },
                Some(responses) if responses == ["123456"] => keyboard::Response::Accept,
                Some(_) => keyboard::Response::Reject,
            }
        )),
        client.request(
            request::Auth::new("user", cookie1.clone())
                .prompter(|request: &sesh_auth::userauth::InfoRequest| {
                    request.prompts.iter().map(|_| "123456".to_string()).collect()
                })
        ),
    )?;

    assert!(cookie0.is_flagged());
    assert!(cookie1.is_flagged());

    Ok(())
}

#[tokio::test]
async fn missing_password() -> Result<(), Box<dyn std::error::Error>> {
    trace();

    let (client, server) = sessions().await?;

    let cookie0 = Cookie::default();
    let cookie1 = Cookie::default();

    let (handled, requested) = tokio::join!(
        server.handle(
            handler::Auth::new(cookie0.clone()).password(|_: String, _: String, _: Option<String>| {
                password::Response::Accept
            })
        ),
        client.request(request::Auth::new("user", cookie1.clone()).publickey(key(Algorithm::Ed25519))),
    );

    assert!(matches!(
        requested,
        Err(Error::Failed {
            diagnostic: Diagnostic::MissingPassword,
            ..
        })
    ));
    assert!(matches!(
        handled,
        Err(Error::Session(SessionError::PeerDisconnected {
            reason: DisconnectReason::NoMoreAuthMethodsAvailable,
            ..
        }))
    ));
    assert!(!cookie0.is_flagged());
    assert!(!cookie1.is_flagged());

    Ok(())
}

#[tokio::test]
async fn unknown_user() -> Result<(), Box<dyn std::error::Error>> {
    trace();

    let (client, server) = sessions().await?;

    let (handled, requested) = tokio::join!(
        server.handle(handler::Auth::new(Cookie::default())),
        client.request(request::Auth::new("nobody", Cookie::default()).password("hunter2")),
    );

    assert!(matches!(
        requested,
        Err(Error::Failed {
            diagnostic: Diagnostic::UnknownUser,
            ..
        })
    ));
    assert!(handled.is_err());

    Ok(())
}

#[tokio::test]
async fn rejected_password() -> Result<(), Box<dyn std::error::Error>> {
    trace();

    let (client, server) = sessions().await?;

    let (handled, requested) = tokio::join!(
        server.handle(
            handler::Auth::new(Cookie::default()).password(|_: String, _: String, _: Option<String>| {
                password::Response::Reject
            })
        ),
        client.request(request::Auth::new("user", Cookie::default()).password("wrong")),
    );

    assert!(matches!(
        requested,
        Err(Error::Failed {
            diagnostic: Diagnostic::Rejected { method: "password" },
            ..
        })
    ));
    assert!(handled.is_err());

    Ok(())
}

#[tokio::test]
async fn password_expired() -> Result<(), Box<dyn std::error::Error>> {
    trace();

    let (client, server) = sessions().await?;

    let (handled, requested) = tokio::join!(
        server.handle(handler::Auth::new(Cookie::default()).password(|_: String, _: String, _: Option<String>| {
            password::Response::PasswordExpired {
                prompt: "Your password has expired".into(),
            }
        })),
        client.request(request::Auth::new("user", Cookie::default()).password("hunter2")),
    );

    match requested {
        Err(Error::PasswordExpired { user, prompt }) => {
            assert_eq!(user, "user");
            assert_eq!(prompt, "Your password has expired");
        }
        other => panic!("Unexpected outcome: {other:?}"),
    }
    assert!(matches!(
        handled,
        Err(Error::Session(SessionError::PeerDisconnected {
            reason: DisconnectReason::AuthCancelledByUser,
            ..
        }))
    ));

    Ok(())
}

#[tokio::test]
async fn rsa_signature_padding_for_legacy_peers() -> Result<(), Box<dyn std::error::Error>> {
    trace();

    let (client, server) = sessions_with(Server {
        id: Id::v2("WeOnlyDo_2.4.3", None::<&str>),
        ..Default::default()
    })
    .await?;

    assert!(client.quirks().contains(sesh::Quirks::PAD_RSA_SIGNATURE));

    let key = key(Algorithm::Rsa { hash: None });
    let authorized = key.public_key().clone();

    let cookie0 = Cookie::default();
    let cookie1 = Cookie::default();

    tokio::try_join!(
        server.handle(handler::Auth::new(cookie0.clone()).publickey(
            move |_: String, key: handler::publickey::PublicKey| {
                if key.key_data() == authorized.key_data() {
                    handler::publickey::Response::Accept
                } else {
                    handler::publickey::Response::Reject
                }
            }
        )),
        client.request(request::Auth::new("user", cookie1.clone()).publickey(key)),
    )?;

    assert!(cookie0.is_flagged());
    assert!(cookie1.is_flagged());

    Ok(())
}

#[rstest]
#[case(true)]
#[case(false)]
#[tokio::test]
async fn publickey_query_asks_the_handler(
    #[case] authorized: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    trace();

    let (mut client, server) = sessions().await?;

    let key = key(Algorithm::Ed25519);
    let asked = Arc::new(AtomicUsize::new(0));

    let handler = handler::Auth::new(Cookie::default()).publickey({
        let asked = asked.clone();

        move |_: String, _: handler::publickey::PublicKey| {
            asked.fetch_add(1, Ordering::Relaxed);

            if authorized {
                handler::publickey::Response::Accept
            } else {
                handler::publickey::Response::Reject
            }
        }
    });

    let script = async {
        start(&mut client).await?;

        let blob = key.public_key().to_bytes().unwrap();
        client
            .send(&userauth::Request {
                username: "user".into(),
                service_name: ssh_packet::arch::ascii!("dummy-service@sesh.rs"),
                method: userauth::Method::Publickey {
                    algorithm: "ssh-ed25519".as_bytes().into(),
                    blob: blob.as_slice().into(),
                    signature: None,
                },
            })
            .await?;

        let response = client.recv().await?;
        client
            .disconnect(DisconnectReason::ByApplication, "done")
            .await?;

        Ok::<_, SessionError>(response)
    };

    let (handled, response) = tokio::join!(server.handle(handler), script);
    let response = response?;

    assert_eq!(response.is::<userauth::PkOk>(), authorized);
    assert_eq!(response.is::<userauth::Failure>(), !authorized);
    assert_eq!(asked.load(Ordering::Relaxed), 1);
    assert!(handled.is_err());

    Ok(())
}

#[tokio::test]
async fn unknown_method_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    trace();

    let (mut client, server) = sessions().await?;

    let handler = handler::Auth::new(Cookie::default())
        .password(|_: String, _: String, _: Option<String>| password::Response::Accept);

    let script = async {
        start(&mut client).await?;

        let string = |value: &str| [&(value.len() as u32).to_be_bytes()[..], value.as_bytes()].concat();
        let payload = [
            &[sesh::MessageType::USERAUTH_REQUEST.0][..],
            string("user").as_slice(),
            string("dummy-service@sesh.rs").as_slice(),
            string("gssapi-with-mic").as_slice(),
        ]
        .concat();

        client.feed_payload(&payload)?;
        client.flush().await?;

        let userauth::Failure { continue_with, .. } = client.recv().await?.to()?;
        let continue_with = continue_with.into_iter().map(|name| name.to_string()).collect::<Vec<_>>();

        client
            .disconnect(DisconnectReason::ByApplication, "done")
            .await?;

        Ok::<_, SessionError>(continue_with)
    };

    let (handled, continue_with) = tokio::join!(server.handle(handler), script);

    assert_eq!(continue_with?, ["password"]);
    assert!(matches!(
        handled,
        Err(Error::Session(SessionError::PeerDisconnected {
            reason: DisconnectReason::ByApplication,
            ..
        }))
    ));

    Ok(())
}

#[tokio::test]
async fn keyboard_interactive_rounds_are_bounded() -> Result<(), Box<dyn std::error::Error>> {
    trace();

    let (client, server) = sessions().await?;

    let challenges = Arc::new(AtomicUsize::new(0));

    let (handled, requested) = tokio::join!(
        server.handle(handler::Auth::new(Cookie::default()).keyboard_interactive({
            let challenges = challenges.clone();

            move |_: String, _: Option<Vec<String>>| {
                challenges.fetch_add(1, Ordering::Relaxed);

                keyboard::Response::Challenge {
                    name: "Login".into(),
                    instruction: String::new(),
                    prompts: vec![keyboard::Prompt {
                        prompt: "Password: ".into(),
                        echo: false,
                    }],
                }
            }
        })),
        client.request(request::Auth::new("user", Cookie::default()).password("hunter2")),
    );

    assert_eq!(challenges.load(Ordering::Relaxed), MAX_ROUNDS);
    assert!(matches!(
        requested,
        Err(Error::Failed {
            diagnostic: Diagnostic::Rejected {
                method: "keyboard-interactive"
            },
            ..
        })
    ));
    assert!(matches!(
        handled,
        Err(Error::Session(SessionError::PeerDisconnected {
            reason: DisconnectReason::NoMoreAuthMethodsAvailable,
            ..
        }))
    ));

    Ok(())
}

#[tokio::test]
async fn keyboard_interactive_overflow() -> Result<(), Box<dyn std::error::Error>> {
    trace();

    let (client, mut server) = sessions().await?;

    let script = async {
        accept(&mut server).await?;

        let _: userauth::Request = server.recv().await?.to()?;
        server.send(&failure(&["keyboard-interactive"])).await?;

        let request: userauth::Request = server.recv().await?.to()?;
        assert!(matches!(
            request.method,
            userauth::Method::KeyboardInteractive { .. }
        ));

        let mut answered = 0;

        loop {
            server
                .send(&userauth::InfoRequest {
                    name: "Login".into(),
                    instruction: String::new(),
                    language: String::new(),
                    prompts: vec![userauth::Prompt {
                        prompt: "Password: ".into(),
                        echo: false,
                    }],
                })
                .await?;

            match server.recv().await {
                Ok(packet) => {
                    let _: userauth::InfoResponse = packet.to()?;
                    answered += 1;
                }
                Err(SessionError::PeerDisconnected { .. }) => break Ok::<_, SessionError>(answered),
                Err(err) => break Err(err),
            }
        }
    };

    let (answered, requested) = tokio::join!(
        script,
        client.request(request::Auth::new("user", Cookie::default()).password("hunter2")),
    );

    assert_eq!(answered?, MAX_ROUNDS);
    assert!(matches!(
        requested,
        Err(Error::Session(SessionError::Overflow { .. }))
    ));

    Ok(())
}

#[tokio::test]
async fn empty_method_list_retries_none() -> Result<(), Box<dyn std::error::Error>> {
    trace();

    let (client, mut server) = sessions().await?;

    let cookie = Cookie::default();

    let script = async {
        accept(&mut server).await?;

        for continue_with in [&[][..], &["password"][..]] {
            let request: userauth::Request = server.recv().await?.to()?;
            assert!(matches!(request.method, userauth::Method::None));

            server.send(&failure(continue_with)).await?;
        }

        let request: userauth::Request = server.recv().await?.to()?;
        assert!(matches!(
            request.method,
            userauth::Method::Password { .. }
        ));

        server.send(&userauth::Success).await
    };

    let (scripted, requested) = tokio::join!(
        script,
        client.request(request::Auth::new("user", cookie.clone()).password("hunter2")),
    );

    scripted?;
    assert_eq!(requested?, Stage::Established);
    assert!(cookie.is_flagged());

    Ok(())
}

#[tokio::test]
async fn empty_method_list_twice_is_an_unknown_user() -> Result<(), Box<dyn std::error::Error>> {
    trace();

    let (client, mut server) = sessions().await?;

    let script = async {
        accept(&mut server).await?;

        for _ in 0..2 {
            let request: userauth::Request = server.recv().await?.to()?;
            assert!(matches!(request.method, userauth::Method::None));

            server.send(&failure(&[])).await?;
        }

        server.recv().await
    };

    let (scripted, requested) = tokio::join!(
        script,
        client.request(request::Auth::new("user", Cookie::default()).password("hunter2")),
    );

    assert!(matches!(
        scripted,
        Err(SessionError::PeerDisconnected {
            reason: DisconnectReason::NoMoreAuthMethodsAvailable,
            ..
        })
    ));
    assert!(matches!(
        requested,
        Err(Error::Failed {
            diagnostic: Diagnostic::UnknownUser,
            ..
        })
    ));

    Ok(())
}
