// Author: Dustin Pilgrim
// License: MIT

use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::protocol::Response;

pub fn is_client_disconnect(e: &io::Error) -> bool {
    use std::io::ErrorKind::*;
    matches!(e.kind(), BrokenPipe | ConnectionReset | UnexpectedEof)
}

/// Write one response line. A client that already hung up is not an error.
pub async fn write_reply<W>(stream: &mut W, resp: Response) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let res = async {
        stream.write_all(resp.line().as_bytes()).await?;
        stream.flush().await
    }
    .await;

    match res {
        Err(e) if is_client_disconnect(&e) => {
            eventline::debug!("client gone before reply err={}", e);
            Ok(())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disconnect_kinds() {
        assert!(is_client_disconnect(&io::Error::from(io::ErrorKind::BrokenPipe)));
        assert!(is_client_disconnect(&io::Error::from(io::ErrorKind::ConnectionReset)));
        assert!(!is_client_disconnect(&io::Error::from(io::ErrorKind::PermissionDenied)));
    }

    #[tokio::test]
    async fn writes_exact_line() {
        let mut out: Vec<u8> = Vec::new();
        write_reply(&mut out, Response::UnknownCommand).await.unwrap();
        assert_eq!(out, b"ERR unknown command\n");
    }
}
