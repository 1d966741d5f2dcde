//! A one-shot fake server: accepts a single connection, answers each
//! request frame from a caller-supplied table keyed by opcode, in the
//! same length-prefixed framing the real client speaks. An opcode with
//! several registered replies hands them out in order, one per request,
//! so a multi-packet exchange (like the backup volume loop) can be
//! scripted as a sequence.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;

use bytes::Bytes;
use rye_client_rs::protocol::transport::PacketStream;
use tokio::net::TcpListener;

pub type Reply = Box<dyn Fn(Bytes) -> Bytes + Send>;

pub struct FakeServer {
    replies: HashMap<u16, VecDeque<Reply>>,
}

impl FakeServer {
    pub fn new() -> Self {
        Self { replies: HashMap::new() }
    }

    /// Register a single canned reply payload builder for one opcode.
    pub fn on(self, opcode: u16, reply: impl Fn(Bytes) -> Bytes + Send + 'static) -> Self {
        self.on_sequence(opcode, vec![Box::new(reply)])
    }

    /// Register a sequence of reply builders for one opcode, consumed in
    /// order across successive requests to that opcode.
    pub fn on_sequence(mut self, opcode: u16, replies: Vec<Reply>) -> Self {
        self.replies.entry(opcode).or_default().extend(replies);
        self
    }

    /// Bind to an ephemeral port, accept exactly one connection, and
    /// answer every request the registered table covers until the client
    /// disconnects or a queue runs dry. Returns the address to connect to.
    pub async fn spawn(self) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind fake server");
        let addr = listener.local_addr().expect("local_addr");
        let mut replies = self.replies;
        tokio::spawn(async move {
            let (socket, _) = match listener.accept().await {
                Ok(pair) => pair,
                Err(_) => return,
            };
            let mut stream = PacketStream::new(socket);
            loop {
                let frame = match stream.read_frame().await {
                    Ok(f) => f,
                    Err(_) => break,
                };
                let reply = match replies.get_mut(&frame.opcode).and_then(|q| q.pop_front()) {
                    Some(f) => f(frame.payload),
                    None => panic!("fake server ran out of replies for opcode {}", frame.opcode),
                };
                let mut wire = Vec::with_capacity(6 + reply.len());
                wire.extend_from_slice(&0u16.to_be_bytes());
                wire.extend_from_slice(&(reply.len() as u32).to_be_bytes());
                wire.extend_from_slice(&reply);
                if stream.write_raw(&wire).await.is_err() {
                    break;
                }
            }
        });
        addr
    }
}
