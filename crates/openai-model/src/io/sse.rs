use super::{Chunks, ChunksError};

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    ChunksError(ChunksError),
    InvalidPayload,
}

/// A type for reading server-sent events from a chunk stream.
///
/// Only the `data` field is surfaced. Comment lines (some gateways send
/// them as keep-alives) and the `event`, `id` and `retry` fields are
/// skipped.
pub struct Sse {
    buf: String,
    // Bytes of an incomplete UTF-8 sequence split across chunks.
    pending_bytes: Vec<u8>,
    chunks: Chunks,
}

impl Sse {
    #[inline]
    pub fn new(chunks: Chunks) -> Self {
        Self {
            buf: String::new(),
            pending_bytes: Vec::new(),
            chunks,
        }
    }

    pub async fn next_event(&mut self) -> Result<Option<String>, Error> {
        loop {
            // Drain what is already buffered before reading more.
            if let Some(event) = self.try_parse_event()? {
                return Ok(Some(event));
            }

            let Some(bytes) =
                self.chunks.next_chunk().await.map_err(Error::ChunksError)?
            else {
                return Ok(None);
            };
            self.push_bytes(&bytes)?;
        }
    }

    fn push_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.pending_bytes.extend_from_slice(bytes);
        let valid_len = match str::from_utf8(&self.pending_bytes) {
            Ok(_) => self.pending_bytes.len(),
            // `error_len() == None` means the input ended in the middle of
            // a sequence, wait for the next chunk.
            Err(err) if err.error_len().is_none() => err.valid_up_to(),
            Err(_) => return Err(Error::InvalidPayload),
        };
        let rest = self.pending_bytes.split_off(valid_len);
        let valid = std::mem::replace(&mut self.pending_bytes, rest);
        let text = String::from_utf8(valid).map_err(|_| Error::InvalidPayload)?;
        self.buf.push_str(&text.replace("\r\n", "\n"));
        Ok(())
    }

    fn try_parse_event(&mut self) -> Result<Option<String>, Error> {
        loop {
            // event         = *( comment / field ) end-of-line
            // comment       = colon *any-char end-of-line
            // field         = 1*name-char [ colon [ space ] *any-char ] end-of-line
            let Some(eol_idx) = self.buf.find("\n\n") else {
                return Ok(None);
            };

            let mut data: Option<String> = None;
            for line in self.buf[0..eol_idx].lines() {
                if line.starts_with(':') {
                    continue;
                }
                let Some((name, value)) = line.split_once(':') else {
                    return Err(Error::InvalidPayload);
                };
                if name != "data" {
                    continue;
                }
                let value = value.strip_prefix(' ').unwrap_or(value);
                match &mut data {
                    Some(data) => {
                        data.push('\n');
                        data.push_str(value);
                    }
                    None => data = Some(value.to_owned()),
                }
            }

            // Consume the bytes from the buffer.
            self.buf.drain(0..eol_idx + 2);

            if data.is_some() {
                return Ok(data);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn sse_of(chunks: &[&'static [u8]]) -> Sse {
        Sse::new(Chunks::from_vec_deque(
            chunks.iter().copied().map(Bytes::from_static).collect(),
        ))
    }

    #[tokio::test]
    async fn test_normal_events() {
        let mut sse = sse_of(&[b"data: hello\n\n", b"data: bye\n\n"]);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "hello");
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "bye");
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_multiple_events_in_one_chunk() {
        let mut sse = sse_of(&[b"data: a\n\ndata: b\n\n"]);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "a");
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "b");
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_quirk_streaming() {
        let mut sse = sse_of(&[b"data:", b" hello\n", b"\n"]);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "hello");
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_comments_and_crlf() {
        let mut sse = sse_of(&[
            b": OPENROUTER PROCESSING\n\n",
            b"event: message\r\ndata: hi\r\n\r\n",
        ]);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "hi");
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_split_utf8_sequence() {
        // "é" is 0xC3 0xA9.
        let mut sse = sse_of(&[b"data: caf\xC3", b"\xA9\n\n"]);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "café");
    }

    #[tokio::test]
    async fn test_invalid_data() {
        let mut sse = sse_of(&[b"xxxxxx\n\n"]);
        assert_eq!(sse.next_event().await.unwrap_err(), Error::InvalidPayload);

        let mut sse = sse_of(&[b"xxxxxx\n"]);
        assert_eq!(sse.next_event().await.unwrap(), None);

        let mut sse = sse_of(&[b"data: hello\n", b"data: bye\n"]);
        assert_eq!(sse.next_event().await.unwrap(), None);

        let mut sse = sse_of(&[b"data: \xFF\xFE\n\n"]);
        assert_eq!(sse.next_event().await.unwrap_err(), Error::InvalidPayload);
    }
}
