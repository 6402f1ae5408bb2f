use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// What a stubbed bidder endpoint should do with each call
#[derive(Debug, Clone)]
pub enum StubBehavior {
    /// Respond 200 with a single-seat bid response
    Bid {
        bid_id: String,
        imp_id: String,
        price: f64,
    },
    /// Respond 200 with a verbatim json body
    Body(String),
    /// Respond with the given status and an empty body
    Status(u16),
    /// Hold the connection before answering 204
    Sleep(Duration),
}

async fn read_request(socket: &mut tokio::net::TcpStream) {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    loop {
        let Ok(n) = socket.read(&mut chunk).await else {
            return;
        };

        if n == 0 {
            return;
        }

        buf.extend_from_slice(&chunk[..n]);

        let Some(header_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };

        let headers = String::from_utf8_lossy(&buf[..header_end]).to_lowercase();
        let content_length = headers
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);

        if buf.len() >= header_end + 4 + content_length {
            return;
        }
    }
}

async fn write_response(socket: &mut tokio::net::TcpStream, status: u16, body: &str) {
    let reason = match status {
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        _ => "Error",
    };

    let response = format!(
        "HTTP/1.1 {} {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
        status,
        reason,
        body.len(),
        body
    );

    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

/// Spawn a one-behavior bidder endpoint, returning its url
pub async fn stub_bidder(behavior: StubBehavior) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };

            let behavior = behavior.clone();

            tokio::spawn(async move {
                read_request(&mut socket).await;

                match behavior {
                    StubBehavior::Bid {
                        bid_id,
                        imp_id,
                        price,
                    } => {
                        let body = format!(
                            r#"{{"id":"stub","cur":"USD","seatbid":[{{"seat":"stub","bid":[{{"id":"{}","impid":"{}","price":{},"adm":"<div/>","crid":"cr-1","w":300,"h":250}}]}}]}}"#,
                            bid_id, imp_id, price
                        );

                        write_response(&mut socket, 200, &body).await;
                    }
                    StubBehavior::Body(body) => {
                        write_response(&mut socket, 200, &body).await;
                    }
                    StubBehavior::Status(status) => {
                        write_response(&mut socket, status, "").await;
                    }
                    StubBehavior::Sleep(delay) => {
                        tokio::time::sleep(delay).await;
                        write_response(&mut socket, 204, "").await;
                    }
                }
            });
        }
    });

    format!("http://{}", addr)
}
