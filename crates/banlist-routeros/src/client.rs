//! Request/reply exchange over an established API connection

use std::collections::HashMap;
use std::time::Duration;

use banlist_core::{Error, Result};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::codec;

/// Byte stream carrying the API: plain TCP or TLS.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Transport for T {}

/// Attributes of one reply sentence (`=key=value` words).
pub type Attributes = HashMap<String, String>;

/// Collected replies to one command
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Response {
    /// `!re` sentences, in order
    pub records: Vec<Attributes>,
    /// Attributes of the closing `!done`
    pub done: Attributes,
}

/// Split an attribute word into key and value.
///
/// API attribute words have the form `=key=value`; the value may itself
/// contain `=`. Other words (`.tag=...`, bare words) are not attributes.
pub fn parse_attribute(word: &str) -> Option<(&str, &str)> {
    word.strip_prefix('=')?.split_once('=')
}

fn attributes(words: &[String]) -> Attributes {
    words
        .iter()
        .filter_map(|word| parse_attribute(word))
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

/// One API connection
///
/// Commands run strictly one after another. A timeout or I/O failure leaves
/// unread replies on the wire, so the client refuses further commands after
/// one.
pub struct Client {
    stream: Box<dyn Transport>,
    timeout: Duration,
    broken: bool,
}

impl Client {
    /// Wrap a connected stream. `timeout` bounds every command.
    pub fn new(stream: Box<dyn Transport>, timeout: Duration) -> Self {
        Self {
            stream,
            timeout,
            broken: false,
        }
    }

    /// Authenticate with `/login`.
    ///
    /// Devices older than 6.43 answer with a `ret` challenge instead of
    /// accepting the credentials; those are rejected.
    pub async fn login(&mut self, user: &str, password: &str) -> Result<()> {
        let response = self.run(crate::command::login(user, password)).await?;
        if response.done.contains_key("ret") {
            return Err(Error::device(
                "device requested challenge login, RouterOS 6.43 or later is required",
            ));
        }
        Ok(())
    }

    /// Send a command and collect its replies.
    ///
    /// # Errors
    ///
    /// - `Error::Device`: the device answered `!trap` (carrying its
    ///   `message`) or `!fatal`
    /// - `Error::Timeout`: no `!done` within the command timeout
    /// - `Error::Network`: the connection failed
    pub async fn run(&mut self, words: Vec<String>) -> Result<Response> {
        if self.broken {
            return Err(Error::device("connection unusable after an earlier failure"));
        }

        let result = match tokio::time::timeout(self.timeout, self.exchange(&words)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(self.timeout)),
        };

        if matches!(result, Err(Error::Timeout(_) | Error::Network(_))) {
            self.broken = true;
        }
        result
    }

    async fn exchange(&mut self, words: &[String]) -> Result<Response> {
        codec::write_sentence(&mut self.stream, words).await?;

        let mut response = Response::default();
        let mut trap: Option<String> = None;

        loop {
            let sentence = codec::read_sentence(&mut self.stream).await?;
            let Some((reply, rest)) = sentence.split_first() else {
                continue;
            };

            match reply.as_str() {
                "!re" => response.records.push(attributes(rest)),
                "!trap" => {
                    // Only the first trap is reported; !done still follows.
                    if trap.is_none() {
                        let message = attributes(rest)
                            .remove("message")
                            .unwrap_or_else(|| "unknown error".to_string());
                        trap = Some(message);
                    }
                }
                "!done" => {
                    response.done = attributes(rest);
                    break;
                }
                "!fatal" => {
                    self.broken = true;
                    let reason = rest.first().map(String::as_str).unwrap_or("no reason given");
                    return Err(Error::device(format!("fatal: {}", reason)));
                }
                other => {
                    self.broken = true;
                    return Err(Error::device(format!("unexpected reply {}", other)));
                }
            }
        }

        match trap {
            Some(message) => Err(Error::device(message)),
            None => Ok(response),
        }
    }

    /// Shut down the connection.
    pub async fn close(mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    const SECOND: Duration = Duration::from_secs(1);

    fn words(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_attribute() {
        assert_eq!(parse_attribute("=message=no such item"), Some(("message", "no such item")));
        assert_eq!(parse_attribute("=comment=a=b"), Some(("comment", "a=b")));
        assert_eq!(parse_attribute("=.id=*1"), Some((".id", "*1")));
        assert_eq!(parse_attribute(".tag=4"), None);
        assert_eq!(parse_attribute("!done"), None);
    }

    #[tokio::test]
    async fn test_run_collects_records() {
        let mock = Builder::new()
            .write(b"\x12/ip/firewall/print\x00")
            .read(b"\x03!re\x07=.id=*1\x00")
            .read(b"\x03!re\x07=.id=*2\x00")
            .read(b"\x05!done\x00")
            .build();
        let mut client = Client::new(Box::new(mock), SECOND);

        let response = client.run(words(&["/ip/firewall/print"])).await.unwrap();

        assert_eq!(response.records.len(), 2);
        assert_eq!(response.records[1].get(".id").map(String::as_str), Some("*2"));
    }

    #[tokio::test]
    async fn test_trap_becomes_device_error() {
        let mock = Builder::new()
            .write(b"\x0c/ip/test/add\x00")
            .read(b"\x05!trap\x15=message=no such item\x00")
            .read(b"\x05!done\x00")
            .build();
        let mut client = Client::new(Box::new(mock), SECOND);

        let err = client.run(words(&["/ip/test/add"])).await.unwrap_err();

        match err {
            Error::Device(message) => assert_eq!(message, "no such item"),
            other => panic!("expected device error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fatal_poisons_client() {
        let mock = Builder::new()
            .write(b"\x05/quit\x00")
            .read(b"\x06!fatal\x0esession closed\x00")
            .build();
        let mut client = Client::new(Box::new(mock), SECOND);

        assert!(client.run(words(&["/quit"])).await.is_err());
        let err = client.run(words(&["/quit"])).await.unwrap_err();
        assert!(err.to_string().contains("earlier failure"));
    }

    #[tokio::test]
    async fn test_login_rejects_challenge() {
        let mock = Builder::new()
            .write(b"\x06/login\x0b=name=admin\x0e=password=test\x00")
            .read(b"\x05!done\x25=ret=ebddd18303a54111e2dea05a92ab46b4\x00")
            .build();
        let mut client = Client::new(Box::new(mock), SECOND);

        let err = client.login("admin", "test").await.unwrap_err();
        assert!(err.to_string().contains("6.43"));
    }

    #[tokio::test]
    async fn test_login_success() {
        let mock = Builder::new()
            .write(b"\x06/login\x0b=name=admin\x0e=password=test\x00")
            .read(b"\x05!done\x00")
            .build();
        let mut client = Client::new(Box::new(mock), SECOND);

        client.login("admin", "test").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_device_times_out() {
        let mock = Builder::new()
            .write(b"\x05/quit\x00")
            .wait(Duration::from_secs(60))
            .build();
        let mut client = Client::new(Box::new(mock), SECOND);

        let err = client.run(words(&["/quit"])).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(t) if t == SECOND));
    }
}
