//! `aws-chunked` body decoding
//!
//! Streaming SigV4 uploads frame the payload as
//! `<hex-size>;chunk-signature=<sig>\r\n<data>\r\n`, ending with a
//! zero-size frame. Only the framing is removed here; chunk signatures are
//! not verified.

use bytes::{Bytes, BytesMut};
use futures::{StreamExt, stream};
use std::io;

use cairn_s3::BodyStream;

const MAX_HEADER_LINE: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Header,
    Data(usize),
    DataEnd,
    Done,
}

enum Step {
    Data(Bytes),
    NeedMore,
    Done,
}

struct Decoder {
    buf: BytesMut,
    state: State,
}

fn invalid(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

impl Decoder {
    fn step(&mut self) -> io::Result<Step> {
        loop {
            match self.state {
                State::Done => return Ok(Step::Done),
                State::Header => {
                    let Some(pos) = self.buf.windows(2).position(|w| w == b"\r\n") else {
                        if self.buf.len() > MAX_HEADER_LINE {
                            return Err(invalid("chunk header too long"));
                        }
                        return Ok(Step::NeedMore);
                    };
                    let line = self.buf.split_to(pos + 2);
                    let header = std::str::from_utf8(&line[..pos])
                        .map_err(|_| invalid("chunk header is not text"))?;
                    let size_hex = header.split(';').next().unwrap_or_default().trim();
                    let size = usize::from_str_radix(size_hex, 16)
                        .map_err(|_| invalid("bad chunk size"))?;
                    self.state = if size == 0 {
                        State::Done
                    } else {
                        State::Data(size)
                    };
                }
                State::Data(remaining) => {
                    if self.buf.is_empty() {
                        return Ok(Step::NeedMore);
                    }
                    let take = remaining.min(self.buf.len());
                    let data = self.buf.split_to(take).freeze();
                    self.state = if take == remaining {
                        State::DataEnd
                    } else {
                        State::Data(remaining - take)
                    };
                    return Ok(Step::Data(data));
                }
                State::DataEnd => {
                    if self.buf.len() < 2 {
                        return Ok(Step::NeedMore);
                    }
                    if &self.buf[..2] != b"\r\n" {
                        return Err(invalid("missing chunk terminator"));
                    }
                    let _ = self.buf.split_to(2);
                    self.state = State::Header;
                }
            }
        }
    }
}

/// Strip `aws-chunked` framing from a body
pub fn decode_aws_chunked(body: BodyStream) -> BodyStream {
    let decoder = Decoder {
        buf: BytesMut::new(),
        state: State::Header,
    };
    stream::try_unfold((body, decoder), |(mut body, mut decoder)| async move {
        loop {
            match decoder.step()? {
                Step::Data(data) => return Ok(Some((data, (body, decoder)))),
                Step::Done => return Ok(None),
                Step::NeedMore => match body.next().await {
                    Some(chunk) => decoder.buf.extend_from_slice(&chunk?),
                    None => {
                        return Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "aws-chunked body ended before the final frame",
                        ));
                    }
                },
            }
        }
    })
    .boxed()
}
