#![allow(dead_code)]

use async_std::net::{TcpListener, TcpStream};
use futures::io::BufReader;

use sesh::{
    side::{client::Client, server::Server},
    Result, Session,
};

pub type Pipe = BufReader<TcpStream>;

pub fn trace() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .ok();
}

pub fn server() -> Server {
    Server {
        keys: vec![ssh_key::PrivateKey::random(
            &mut rand::thread_rng(),
            ssh_key::Algorithm::Ed25519,
        )
        .expect("Unable to generate a host key")],
        ..Default::default()
    }
}

/// Connect a client and a server over the loopback, without running the handshake.
pub async fn pipes() -> Result<(Pipe, Pipe)> {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
    let addr = listener.local_addr()?;

    let (client, (server, _)) = futures::try_join!(TcpStream::connect(addr), listener.accept())?;

    Ok((BufReader::new(client), BufReader::new(server)))
}

/// Run the handshake of both sides concurrently.
pub async fn sessions(
    client: Client,
    server: Server,
) -> Result<(Session<Pipe, Client>, Session<Pipe, Server>)> {
    let (cpipe, spipe) = pipes().await?;

    futures::try_join!(Session::new(cpipe, client), Session::new(spipe, server))
}
