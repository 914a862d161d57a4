//! TCP ingest socket for frame streams.
use futures::StreamExt;
use tokio::{
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::StaticFrameSender;

/// Listen for frame streams on a TCP socket and feed them into the incoming
/// channel.
pub async fn spawn_data_socket(
    tx: StaticFrameSender,
    addr: &str,
) -> std::io::Result<JoinHandle<std::io::Result<()>>> {
    let listener = TcpListener::bind(addr).await?;
    log::info!("Data socket listening on {addr}");

    Ok(tokio::spawn(async move {
        loop {
            let (socket, _) = listener.accept().await?;
            let tx = tx.clone();
            tokio::spawn(async move { handle_incoming(socket, tx).await });
        }
    }))
}

async fn handle_incoming(stream: TcpStream, tx: StaticFrameSender) -> std::io::Result<()> {
    log::info!("{}: New connection", stream.peer_addr()?);

    let mut transport = Framed::new(stream, LengthDelimitedCodec::new());

    while let Some(Ok(frame)) = transport.next().await {
        // Backpressure by dropping: the router drains this channel quickly,
        // a full buffer means the whole pipeline is behind.
        match tx.try_send_ref() {
            Ok(mut slot) => {
                slot.clear();
                slot.extend_from_slice(&frame);
            }
            Err(_) => log::debug!("Incoming channel full, dropping frame"),
        }
    }

    Ok(())
}
