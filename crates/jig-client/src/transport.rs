//! Serial link plumbing: line framing in, one serialized writer out.

use jig_core::{Frame, LINE_END};
use std::io;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tokio_util::bytes::BytesMut;
use tokio_util::codec::{Decoder, FramedRead};

/// Longest line kept before it is treated as noise.
pub const MAX_LINE_LEN: usize = 256;

/// Outbound frames queue here and are written by a single task, so frames
/// from different tasks never interleave on the wire.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::Sender<Frame>,
}

impl Outbox {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    pub async fn send(&self, frame: Frame) {
        tracing::debug!("tx {}", frame);
        if self.tx.send(frame).await.is_err() {
            tracing::warn!("link writer has stopped; frame dropped");
        }
    }
}

/// Drain the outbox onto the link until every sender is gone.
pub async fn write_frames<W>(mut rx: mpsc::Receiver<Frame>, mut writer: W) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = rx.recv().await {
        writer.write_all(frame.encode().as_bytes()).await?;
        writer.write_all(LINE_END.as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(())
}

/// Splits the byte stream on `\n`, dropping a trailing `\r`. Lines longer
/// than the limit are discarded up to the next newline.
#[derive(Debug)]
pub struct LineCodec {
    max_len: usize,
    discarding: bool,
}

impl LineCodec {
    pub fn new(max_len: usize) -> Self {
        Self {
            max_len,
            discarding: false,
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new(MAX_LINE_LEN)
    }
}

impl Decoder for LineCodec {
    type Item = Vec<u8>;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Vec<u8>>, io::Error> {
        loop {
            let Some(pos) = buf.iter().position(|b| *b == b'\n') else {
                if buf.len() > self.max_len {
                    tracing::warn!("dropping {} bytes without a line break", buf.len());
                    buf.clear();
                    self.discarding = true;
                }
                return Ok(None);
            };

            let line = buf.split_to(pos + 1);
            if std::mem::take(&mut self.discarding) {
                continue;
            }
            let mut line = line[..pos].to_vec();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            return Ok(Some(line));
        }
    }
}

/// Complete inbound lines from any reader.
pub fn frames<R: AsyncRead>(reader: R) -> FramedRead<R, LineCodec> {
    FramedRead::new(reader, LineCodec::default())
}

pub fn open_serial(device: &str, baud: u32) -> io::Result<SerialStream> {
    let port = tokio_serial::new(device, baud).open_native_async()?;
    tracing::info!("opened {} at {} baud", device, baud);
    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use jig_core::{Command, DeviceResponse, SERIAL_RESP_SIZE};

    #[test]
    fn splits_lines_and_strips_cr() {
        let mut codec = LineCodec::default();
        let mut buf = BytesMut::from(&b"one\r\ntwo\nthr"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(b"one".to_vec()));
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(b"two".to_vec()));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b"ee\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(b"three".to_vec()));
    }

    #[test]
    fn overlong_lines_are_discarded() {
        let mut codec = LineCodec::new(8);
        let mut buf = BytesMut::from(&b"0123456789abc"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b"tail\nok\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(b"ok".to_vec()));
    }

    #[test]
    fn invalid_utf8_passes_through() {
        let mut codec = LineCodec::default();
        let mut buf = BytesMut::from(&b"\xff\xfe\n"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(vec![0xff, 0xfe]));
    }

    #[tokio::test]
    async fn writer_terminates_each_frame() {
        let (outbox, rx) = Outbox::channel(4);
        let (client, server) = tokio::io::duplex(1024);

        outbox
            .send(Frame::new(Command::Status, 1, 2, DeviceResponse::pass("ok")))
            .await;
        outbox.send(Frame::boot()).await;
        drop(outbox);

        write_frames(rx, client).await.unwrap();

        let lines: Vec<_> = frames(server).collect().await;
        assert_eq!(lines.len(), 2);
        let first = lines[0].as_ref().unwrap();
        assert_eq!(first.len(), SERIAL_RESP_SIZE);
        assert!(first.starts_with(b"@,S,0001,0002,P,"));
        assert!(lines[1].as_ref().unwrap().starts_with(b"@,R,-001,-001,"));
    }
}
