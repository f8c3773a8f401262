#![allow(clippy::unwrap_used)]

use std::sync::{Arc, Mutex};

use async_compat::{Compat, CompatExt};
use rstest::rstest;
use sesh::{
    algorithm::Kex,
    side::{
        client::{Algorithms, Client},
        server::Server,
    },
    Error as SessionError, ErrorKind, Id, MessageType, Session,
};
use sesh_auth::{
    handler::{self, password},
    request,
};
use sesh_connect::{
    channel::{request::Response, LARGE_WINDOW, SMALL_WINDOW},
    connect::{channel_open, global_request, Connect, MAX_CHANNELS},
    message::{
        ChannelOpenFailureReason, ChannelRequestContext, ChannelSuccess, ChannelType,
        GlobalRequestContext,
    },
    Error, Service,
};
use ssh_key::{Algorithm, PrivateKey};
use tokio::io::{BufStream, DuplexStream};

type Duplex = Compat<BufStream<DuplexStream>>;

fn trace() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .ok();
}

/// Run the handshake and the password authentication of both sides over an in-memory pipe.
async fn connect(client: Client) -> Result<(Connect<Duplex, Client>, Connect<Duplex, Server>), Error> {
    let duplex = tokio::io::duplex(sesh::stream::MAX_PACKET_SIZE * 16);

    let server = Server {
        keys: vec![PrivateKey::random(&mut rand::thread_rng(), Algorithm::Ed25519).unwrap()],
        ..Default::default()
    };

    let (client, server) = tokio::try_join!(
        Session::new(BufStream::new(duplex.0).compat(), client),
        Session::new(BufStream::new(duplex.1).compat(), server),
    )?;

    let (client, server) = tokio::try_join!(
        client.request(request::Auth::new("user", Service).password("hunter2")),
        server.handle(handler::Auth::new(Service).password(
            |user: String, password: String, _: Option<String>| {
                if user == "user" && password == "hunter2" {
                    password::Response::Accept
                } else {
                    password::Response::Reject
                }
            }
        )),
    )?;

    let server = server.on_channel_open(|kind: &ChannelType| match kind {
        ChannelType::Session => channel_open::Outcome::Accept,
        _ => channel_open::Outcome::Reject {
            reason: ChannelOpenFailureReason::UnknownChannelType,
            description: "Only sessions are supported".into(),
        },
    });

    Ok((client, server))
}

fn group14() -> Client {
    Client {
        algorithms: Algorithms {
            kexs: vec![Kex::DiffieHellmanGroup14Sha256],
            ..Default::default()
        },
        ..Default::default()
    }
}

async fn read_to_end<IO: sesh::Pipe, S: sesh::side::Side>(
    connect: &mut Connect<IO, S>,
) -> Result<Vec<u8>, Error> {
    let mut data = Vec::new();
    let mut buf = [0u8; 1024];

    loop {
        match connect.read(&mut buf).await? {
            0 => break Ok(data),
            n => data.extend_from_slice(&buf[..n]),
        }
    }
}

#[tokio::test]
async fn shell_session() -> Result<(), Box<dyn std::error::Error>> {
    trace();

    let (mut client, server) = connect(group14()).await?;
    let mut server = server.on_channel_request(|_: u32, context: &ChannelRequestContext| {
        match context {
            ChannelRequestContext::PtyReq { .. } | ChannelRequestContext::Shell => {
                Response::Success
            }
            _ => Response::Failure,
        }
    });

    let (echoed, _) = tokio::try_join!(
        async move {
            let id = client.open(ChannelType::Session).await?;
            assert!(client.channel(id)?.is_active());

            let pty = client
                .request(ChannelRequestContext::PtyReq {
                    term: "xterm-256color".into(),
                    width_chars: 80,
                    height_chars: 24,
                    width_pixels: 0,
                    height_pixels: 0,
                    modes: vec![0],
                })
                .await?;
            assert_eq!(pty, Response::Success);
            assert_eq!(
                client.request(ChannelRequestContext::Shell).await?,
                Response::Success
            );

            client.write_all(b"echo hello").await?;
            client.shutdown(id).await?;

            let echoed = read_to_end(&mut client).await?;
            assert_eq!(client.channel(id)?.exit_status(), Some(0));

            client.close(id).await?;
            assert_eq!(client.channels().count(), 0);

            Ok::<_, Error>(echoed)
        },
        async move {
            let id = server.accept().await?;
            assert_eq!(server.channel(id)?.kind(), &ChannelType::Session);

            let received = read_to_end(&mut server).await?;
            server.write_all(&received).await?;

            server
                .notify(ChannelRequestContext::ExitStatus { code: 0 })
                .await?;
            server.shutdown(id).await?;
            server.close(id).await?;

            Ok::<_, Error>(())
        }
    )?;

    assert_eq!(echoed, b"echo hello");

    Ok(())
}

#[tokio::test]
async fn small_window_blocks_writes() -> Result<(), Box<dyn std::error::Error>> {
    trace();

    let (mut client, mut server) = connect(Client {
        id: Id::v2("PuTTY_Release_0.58", None::<&str>),
        ..Default::default()
    })
    .await?;

    let (id, _) = tokio::try_join!(client.open(ChannelType::Session), server.accept())?;
    assert_eq!(client.channel(id)?.remote_window().count(), SMALL_WINDOW);

    let chunk = vec![0x42; 32768];

    let mut written = 0;
    loop {
        match client.try_write(&chunk).await? {
            0 => break,
            n => written += n,
        }
    }
    assert_eq!(written, SMALL_WINDOW as usize);

    let expected = written + chunk.len();
    let (_, received) = tokio::try_join!(client.write(&chunk), async {
        let mut received = 0;
        let mut buf = vec![0u8; 65536];

        while received < expected {
            received += server.read(&mut buf).await?;
        }

        Ok::<_, Error>(received)
    })?;
    assert_eq!(received, expected);

    Ok(())
}

#[tokio::test]
async fn flooding_peer_is_bounded_by_the_window() -> Result<(), Box<dyn std::error::Error>> {
    trace();

    let (mut client, mut server) = connect(Client::default()).await?;
    let (id, _) = tokio::try_join!(client.open(ChannelType::Session), server.accept())?;

    let window = client.channel(id)?.local_window().size() as usize;
    assert_eq!(window, LARGE_WINDOW as usize);
    assert!(window <= 1024 * 1024);

    let flood = vec![0x5A; 16 * 1024 * 1024];

    let (_, received) = tokio::try_join!(server.write_all(&flood), async {
        // Only process the inbound messages, without reading anything.
        while client.channel(id)?.pending() < window {
            client.process().await?;

            assert!(client.channel(id)?.pending() <= window);
        }
        assert_eq!(client.channel(id)?.local_window().count(), 0);

        let mut received = 0;
        let mut buf = vec![0u8; 65536];

        while received < flood.len() {
            received += client.read(&mut buf).await?;

            assert!(client.channel(id)?.pending() <= window);
        }

        Ok::<_, Error>(received)
    })?;
    assert_eq!(received, flood.len());

    Ok(())
}

#[tokio::test]
async fn stale_channel_success_is_discarded() -> Result<(), Box<dyn std::error::Error>> {
    trace();

    let (mut client, mut server) = connect(Client::default()).await?;
    let (id, accepted) = tokio::try_join!(client.open(ChannelType::Session), server.accept())?;

    let recipient_channel = server.channel(accepted)?.write_id();
    server.enqueue(&ChannelSuccess { recipient_channel }).await?;
    server.flush().await?;

    client.process().await?;
    assert!(client.channel(id)?.is_active());

    // The default hook refuses everything.
    let (response, _) = tokio::try_join!(
        client.request(ChannelRequestContext::Shell),
        server.process(),
    )?;
    assert_eq!(response, Response::Failure);

    Ok(())
}

#[tokio::test]
async fn channel_limit_is_fatal() -> Result<(), Box<dyn std::error::Error>> {
    trace();

    let (mut client, mut server) = connect(Client::default()).await?;

    for _ in 0..MAX_CHANNELS {
        tokio::try_join!(client.open(ChannelType::Session), server.accept())?;
    }

    let (opened, processed) = tokio::join!(client.open(ChannelType::Session), server.process());

    let err = opened.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Resource);
    assert!(matches!(
        processed,
        Err(Error::Session(SessionError::PeerDisconnected { .. }))
    ));

    Ok(())
}

#[rstest]
#[case(ChannelType::DirectTcpip {
    host: "localhost".into(),
    port: 22,
    originator_address: "127.0.0.1".into(),
    originator_port: 4242,
})]
#[case(ChannelType::Other {
    name: "auth-agent@openssh.com".into(),
    data: vec![],
})]
#[tokio::test]
async fn channel_open_refused(#[case] kind: ChannelType) -> Result<(), Box<dyn std::error::Error>> {
    trace();

    let (mut client, mut server) = connect(Client::default()).await?;

    let (opened, processed) = tokio::join!(client.open(kind), server.process());
    processed?;

    assert!(matches!(
        opened,
        Err(Error::ChannelOpenFailure {
            reason: ChannelOpenFailureReason::UnknownChannelType,
            ..
        })
    ));
    assert_eq!(client.channels().count(), 0);

    Ok(())
}

#[tokio::test]
async fn global_requests() -> Result<(), Box<dyn std::error::Error>> {
    trace();

    let (mut client, server) = connect(Client::default()).await?;
    let mut server = server.on_global_request(|context: &GlobalRequestContext| match context {
        GlobalRequestContext::TcpipForward { .. } => {
            global_request::Outcome::Accept { bound_port: 2222 }
        }
        _ => global_request::Outcome::Reject,
    });

    let (response, _) = tokio::try_join!(
        client.global_request(GlobalRequestContext::TcpipForward {
            bind_address: "localhost".into(),
            bind_port: 0,
        }),
        server.process(),
    )?;
    assert_eq!(response, global_request::Response::Success(Some(2222)));

    let (response, _) = tokio::try_join!(
        client.global_request(GlobalRequestContext::TcpipForward {
            bind_address: "localhost".into(),
            bind_port: 8080,
        }),
        server.process(),
    )?;
    assert_eq!(response, global_request::Response::Success(None));

    let (response, _) = tokio::try_join!(
        client.global_request(GlobalRequestContext::Other {
            name: "keepalive@openssh.com".into(),
            data: vec![],
        }),
        server.process(),
    )?;
    assert_eq!(response, global_request::Response::Failure);

    Ok(())
}

#[tokio::test]
async fn unhandled_channel_request() -> Result<(), Box<dyn std::error::Error>> {
    trace();

    let (mut client, mut server) = connect(Client::default()).await?;
    tokio::try_join!(client.open(ChannelType::Session), server.accept())?;

    let (response, _) = tokio::try_join!(
        client.request(ChannelRequestContext::Exec {
            command: "uname -a".into(),
        }),
        server.process(),
    )?;
    assert_eq!(response, Response::Failure);

    Ok(())
}

#[tokio::test]
async fn notification_rides_along_data() -> Result<(), Box<dyn std::error::Error>> {
    trace();

    let variables = Arc::new(Mutex::new(Vec::new()));

    let (mut client, server) = connect(Client::default()).await?;
    let mut server = server.on_channel_request({
        let variables = variables.clone();

        move |_: u32, context: &ChannelRequestContext| match context {
            ChannelRequestContext::Env { name, value } => {
                variables.lock().unwrap().push((name.clone(), value.clone()));

                Response::Success
            }
            _ => Response::Failure,
        }
    });
    tokio::try_join!(client.open(ChannelType::Session), server.accept())?;

    client
        .notify(ChannelRequestContext::Env {
            name: "LANG".into(),
            value: "C.UTF-8".into(),
        })
        .await?;
    assert_eq!(client.pending(), Some(MessageType::CHANNEL_REQUEST));

    client.write_all(b"ls\n").await?;
    assert_eq!(client.pending(), None);

    let mut buf = [0u8; 16];
    let read = server.read(&mut buf).await?;

    assert_eq!(&buf[..read], b"ls\n");
    assert_eq!(
        variables.lock().unwrap().as_slice(),
        &[("LANG".to_string(), "C.UTF-8".to_string())]
    );

    Ok(())
}

#[tokio::test]
async fn extended_data() -> Result<(), Box<dyn std::error::Error>> {
    trace();

    let (mut client, mut server) = connect(Client::default()).await?;
    tokio::try_join!(client.open(ChannelType::Session), server.accept())?;

    server.write(b"out").await?;
    server.write_ext(b"oops").await?;

    let mut buf = [0u8; 16];

    let read = client.read_ext(&mut buf).await?;
    assert_eq!(&buf[..read], b"oops");

    let read = client.read(&mut buf).await?;
    assert_eq!(&buf[..read], b"out");

    Ok(())
}

#[tokio::test]
async fn write_after_shutdown() -> Result<(), Box<dyn std::error::Error>> {
    trace();

    let (mut client, mut server) = connect(Client::default()).await?;
    let (id, accepted) = tokio::try_join!(client.open(ChannelType::Session), server.accept())?;

    client.shutdown(id).await?;

    assert!(matches!(
        client.write(b"late").await,
        Err(Error::ChannelClosed(closed)) if closed == id
    ));

    let mut buf = [0u8; 16];
    assert_eq!(server.read(&mut buf).await?, 0);
    assert!(server.channel(accepted)?.is_eof());

    Ok(())
}
