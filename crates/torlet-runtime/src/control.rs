//! Tor control-port client
//!
//! A minimal line-based client for the parts of the control protocol the
//! pool forwards: authentication, configuration reads/writes, and signals.

use std::fmt;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use torlet_core::{TorletError, TorletResult};
use tracing::debug;

/// One reply from the control port: final status code plus the text of
/// every reply line.
#[derive(Debug)]
pub struct Reply {
    pub status: u16,
    pub lines: Vec<String>,
}

struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

/// Client for one daemon's control port.
///
/// Commands are serialized: each request holds the connection until its
/// reply is fully read.
pub struct ControlClient {
    connection: Mutex<Connection>,
    address: String,
}

impl ControlClient {
    /// Connect to a control port on localhost
    pub async fn connect(port: u16) -> TorletResult<Self> {
        let address = format!("127.0.0.1:{}", port);
        let stream = TcpStream::connect(&address).await?;
        let (read_half, write_half) = stream.into_split();

        Ok(Self {
            connection: Mutex::new(Connection {
                reader: BufReader::new(read_half),
                writer: write_half,
            }),
            address,
        })
    }

    /// Authenticate the session.
    ///
    /// With no password this performs NULL authentication, which tor accepts
    /// when neither cookie nor password authentication is configured.
    pub async fn authenticate(&self, password: Option<&str>) -> TorletResult<()> {
        let command = match password {
            Some(password) => format!("AUTHENTICATE \"{}\"", escape_value(password)),
            None => "AUTHENTICATE".to_string(),
        };
        self.command(&command).await?;
        debug!(address = %self.address, "Control session authenticated");
        Ok(())
    }

    /// Read a configuration keyword
    pub async fn get_conf(&self, keyword: &str) -> TorletResult<Vec<String>> {
        let reply = self.command(&format!("GETCONF {}", keyword)).await?;
        Ok(parse_conf_values(&reply.lines, keyword))
    }

    /// Write a configuration keyword
    pub async fn set_conf(&self, keyword: &str, value: &str) -> TorletResult<()> {
        let command = if value.chars().any(char::is_whitespace) {
            format!("SETCONF {}=\"{}\"", keyword, escape_value(value))
        } else {
            format!("SETCONF {}={}", keyword, value)
        };
        self.command(&command).await?;
        Ok(())
    }

    /// Send a signal by name (NEWNYM, RELOAD, SHUTDOWN, ...)
    pub async fn signal(&self, signal: &str) -> TorletResult<()> {
        self.command(&format!("SIGNAL {}", signal)).await?;
        Ok(())
    }

    /// Close the session politely
    pub async fn quit(&self) -> TorletResult<()> {
        let mut connection = self.connection.lock().await;
        connection.writer.write_all(b"QUIT\r\n").await?;
        connection.writer.flush().await?;
        Ok(())
    }

    /// Send one command and read its complete reply
    pub async fn command(&self, command: &str) -> TorletResult<Reply> {
        let mut connection = self.connection.lock().await;

        connection
            .writer
            .write_all(format!("{}\r\n", command).as_bytes())
            .await?;
        connection.writer.flush().await?;

        let reply = read_reply(&mut connection.reader).await?;
        if reply.status != 250 {
            return Err(TorletError::Control(format!(
                "{} rejected with {}: {}",
                command.split_whitespace().next().unwrap_or(command),
                reply.status,
                reply.lines.last().map(String::as_str).unwrap_or("")
            )));
        }
        Ok(reply)
    }
}

impl fmt::Debug for ControlClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlClient")
            .field("address", &self.address)
            .finish()
    }
}

async fn read_reply(reader: &mut BufReader<OwnedReadHalf>) -> TorletResult<Reply> {
    let mut status = 0;
    let mut lines = Vec::new();

    loop {
        let mut line = String::new();
        let read = reader.read_line(&mut line).await?;
        if read == 0 {
            return Err(TorletError::Control(
                "control connection closed mid-reply".to_string(),
            ));
        }

        let (code, separator, text) = parse_reply_line(line.trim_end_matches(['\r', '\n']))?;
        status = code;
        lines.push(text.to_string());

        match separator {
            '-' => continue,
            '+' => {
                // Data reply: consume payload lines up to the "." terminator
                loop {
                    let mut data = String::new();
                    let read = reader.read_line(&mut data).await?;
                    if read == 0 {
                        return Err(TorletError::Control(
                            "control connection closed inside data reply".to_string(),
                        ));
                    }
                    let data = data.trim_end_matches(['\r', '\n']);
                    if data == "." {
                        break;
                    }
                    lines.push(data.to_string());
                }
            }
            _ => break,
        }
    }

    Ok(Reply { status, lines })
}

/// Split one reply line into (status, separator, text).
///
/// Lines follow `250-text`, `250+text`, or the final `250 text`.
fn parse_reply_line(line: &str) -> TorletResult<(u16, char, &str)> {
    if line.len() < 4 {
        return Err(TorletError::Control(format!(
            "malformed control reply line: {:?}",
            line
        )));
    }
    let status: u16 = line[..3]
        .parse()
        .map_err(|_| TorletError::Control(format!("malformed control status in {:?}", line)))?;
    let separator = line.as_bytes()[3] as char;
    if !matches!(separator, ' ' | '-' | '+') {
        return Err(TorletError::Control(format!(
            "malformed control separator in {:?}",
            line
        )));
    }
    Ok((status, separator, &line[4..]))
}

/// Extract the values of `keyword` from GETCONF reply lines.
///
/// Each line is `Keyword=value`, or a bare `Keyword` when the keyword sits
/// at its default (reported as an empty value).
fn parse_conf_values(lines: &[String], keyword: &str) -> Vec<String> {
    lines
        .iter()
        .filter_map(|line| match line.split_once('=') {
            Some((key, value)) if key.eq_ignore_ascii_case(keyword) => Some(value.to_string()),
            None if line.eq_ignore_ascii_case(keyword) => Some(String::new()),
            _ => None,
        })
        .collect()
}

fn escape_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
