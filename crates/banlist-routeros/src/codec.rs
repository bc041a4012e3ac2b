//! RouterOS API wire format
//!
//! A sentence is a sequence of words terminated by a zero-length word. Every
//! word is prefixed with its length in a variable-width big-endian encoding:
//!
//! | Length              | Bytes | Prefix bits   |
//! |---------------------|-------|---------------|
//! | `< 0x80`            | 1     | `0xxxxxxx`    |
//! | `< 0x4000`          | 2     | `10xxxxxx`    |
//! | `< 0x200000`        | 3     | `110xxxxx`    |
//! | `< 0x10000000`      | 4     | `1110xxxx`    |
//! | otherwise           | 5     | `11110000`    |

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Longest word accepted from the device.
pub const MAX_WORD_LEN: u32 = 16 * 1024 * 1024;

/// Encode a word length prefix.
pub fn encode_length(len: u32) -> Vec<u8> {
    match len {
        0..0x80 => vec![len as u8],
        0x80..0x4000 => (len | 0x8000).to_be_bytes()[2..].to_vec(),
        0x4000..0x20_0000 => (len | 0xC0_0000).to_be_bytes()[1..].to_vec(),
        0x20_0000..0x1000_0000 => (len | 0xE000_0000).to_be_bytes().to_vec(),
        _ => {
            let mut out = vec![0xF0];
            out.extend_from_slice(&len.to_be_bytes());
            out
        }
    }
}

/// Read a word length prefix.
pub async fn read_length<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<u32> {
    let first = reader.read_u8().await?;
    let (extra, mut len) = match first {
        b if b & 0x80 == 0x00 => (0, u32::from(b)),
        b if b & 0xC0 == 0x80 => (1, u32::from(b & 0x3F)),
        b if b & 0xE0 == 0xC0 => (2, u32::from(b & 0x1F)),
        b if b & 0xF0 == 0xE0 => (3, u32::from(b & 0x0F)),
        0xF0 => (4, 0),
        b => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unsupported length prefix 0x{:02x}", b),
            ));
        }
    };

    for _ in 0..extra {
        len = (len << 8) | u32::from(reader.read_u8().await?);
    }
    Ok(len)
}

/// Read one word. Invalid UTF-8 is replaced rather than rejected.
pub async fn read_word<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<String> {
    let len = read_length(reader).await?;
    if len > MAX_WORD_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("word of {} bytes exceeds limit", len),
        ));
    }

    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).await?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Read words up to the terminating empty word.
pub async fn read_sentence<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Vec<String>> {
    let mut words = Vec::new();
    loop {
        let word = read_word(reader).await?;
        if word.is_empty() {
            return Ok(words);
        }
        words.push(word);
    }
}

/// Write a sentence and its terminator in one buffer.
pub async fn write_sentence<W: AsyncWrite + Unpin>(writer: &mut W, words: &[String]) -> io::Result<()> {
    let mut buf = Vec::new();
    for word in words {
        let len = u32::try_from(word.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "word too long"))?;
        buf.extend_from_slice(&encode_length(len));
        buf.extend_from_slice(word.as_bytes());
    }
    buf.push(0);

    writer.write_all(&buf).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[test]
    fn test_length_prefix_boundaries() {
        assert_eq!(encode_length(0), vec![0x00]);
        assert_eq!(encode_length(0x7F), vec![0x7F]);
        assert_eq!(encode_length(0x80), vec![0x80, 0x80]);
        assert_eq!(encode_length(0x3FFF), vec![0xBF, 0xFF]);
        assert_eq!(encode_length(0x4000), vec![0xC0, 0x40, 0x00]);
        assert_eq!(encode_length(0x1F_FFFF), vec![0xDF, 0xFF, 0xFF]);
        assert_eq!(encode_length(0x20_0000), vec![0xE0, 0x20, 0x00, 0x00]);
        assert_eq!(encode_length(0x1000_0000), vec![0xF0, 0x10, 0x00, 0x00, 0x00]);
    }

    #[tokio::test]
    async fn test_read_multibyte_lengths() {
        let mut mock = Builder::new()
            .read(&[0xBF, 0xFF])
            .read(&[0xE0, 0x20, 0x00, 0x00])
            .build();
        assert_eq!(read_length(&mut mock).await.unwrap(), 0x3FFF);
        assert_eq!(read_length(&mut mock).await.unwrap(), 0x20_0000);
    }

    #[tokio::test]
    async fn test_reserved_prefix_rejected() {
        let mut mock = Builder::new().read(&[0xF8]).build();
        let err = read_length(&mut mock).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn test_write_login_sentence() {
        let mut mock = Builder::new()
            .write(b"\x06/login\x0b=name=admin\x0e=password=test\x00")
            .build();
        let words = vec![
            "/login".to_string(),
            "=name=admin".to_string(),
            "=password=test".to_string(),
        ];
        write_sentence(&mut mock, &words).await.unwrap();
    }

    #[tokio::test]
    async fn test_read_reply_sentences() {
        let mut mock = Builder::new()
            .read(b"\x03!re\x0c=.id=*1A2B3C\x00")
            .read(b"\x05!done\x00")
            .build();
        assert_eq!(
            read_sentence(&mut mock).await.unwrap(),
            vec!["!re".to_string(), "=.id=*1A2B3C".to_string()]
        );
        assert_eq!(read_sentence(&mut mock).await.unwrap(), vec!["!done".to_string()]);
    }

    #[tokio::test]
    async fn test_truncated_word_is_an_error() {
        let mut mock = Builder::new().read(b"\x05!do").build();
        assert!(read_sentence(&mut mock).await.is_err());
    }
}
