//! Client connection driver
//!
//! One WebSocket per room. The reader feeds the sync buffer; input and render
//! run on their own intervals and only meet the reader through that buffer.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::input::InputSource;
use super::render::Renderer;
use super::sync::{SharedSyncBuffer, SyncBuffer};
use crate::util::time::{unix_millis, INPUT_INTERVAL_MS, RENDER_INTERVAL_MS};
use crate::ws::protocol::{
    decode_server_msg, encode, ClientMsg, ProtocolError, ServerMsg, SimConfig, Team,
};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Client errors
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// What to do once connected
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Server base URL, e.g. `ws://127.0.0.1:8080`
    pub url: String,
    pub room: String,
    pub team: Option<Team>,
    pub team_size: Option<u32>,
    pub name: Option<String>,
    /// Identity kept across reconnects; the wallet stands in when absent
    pub player_key: Option<String>,
    /// Claim host with this wallet right after joining
    pub wallet: Option<String>,
    /// Send `start` after joining (needs host rights)
    pub start: bool,
    pub duration_min: Option<u32>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8080".to_string(),
            room: "lobby".to_string(),
            team: None,
            team_size: None,
            name: None,
            player_key: None,
            wallet: None,
            start: false,
            duration_min: None,
        }
    }
}

impl ClientOptions {
    pub fn room_url(&self) -> String {
        format!("{}/ws/{}", self.url.trim_end_matches('/'), self.room)
    }

    /// Messages sent as soon as the socket opens, in order
    pub fn opening_messages(&self) -> Vec<ClientMsg> {
        let mut msgs = vec![ClientMsg::Join {
            team: self.team,
            team_size: self.team_size,
            name: self.name.clone(),
            player_key: self.player_key.clone(),
            wallet: self.wallet.clone(),
        }];
        if let Some(wallet) = &self.wallet {
            msgs.push(ClientMsg::ClaimHost {
                wallet: Some(wallet.clone()),
            });
        }
        if self.start {
            msgs.push(ClientMsg::Start {
                duration_min: self.duration_min,
                wallet: self.wallet.clone(),
            });
        }
        msgs
    }
}

/// Connection-scoped state the reader fills in
#[derive(Debug, Default)]
pub struct Session {
    pub id: Option<Uuid>,
    pub config: SimConfig,
}

/// Apply one server frame to the session and buffer
pub fn handle_server_msg(
    msg: ServerMsg,
    session: &Mutex<Session>,
    buffer: &SharedSyncBuffer,
    local_now: u64,
) {
    match msg {
        ServerMsg::Welcome { id, room, config } => {
            info!(conn_id = %id, room = %room, "Welcomed");
            let mut session = session.lock();
            session.id = Some(id);
            session.config = config;
        }
        ServerMsg::Snapshot(snapshot) => {
            buffer.lock().ingest(snapshot, local_now);
        }
    }
}

/// Connect, announce, then run reader / input / render until the server
/// closes the connection.
pub async fn run(
    options: ClientOptions,
    mut input: Box<dyn InputSource>,
    mut renderer: Box<dyn Renderer>,
) -> Result<(), ClientError> {
    let url = options.room_url();
    info!(url = %url, "Connecting");

    let (socket, _) = connect_async(url.as_str()).await?;
    let (mut ws_sink, mut ws_stream) = socket.split();

    for msg in options.opening_messages() {
        send_msg(&mut ws_sink, &msg).await?;
    }

    let buffer = SyncBuffer::shared();
    let session = Arc::new(Mutex::new(Session::default()));

    // Input task: sample and send at a fixed rate
    let input_handle = tokio::spawn(async move {
        let mut ticker = interval(Duration::from_millis(INPUT_INTERVAL_MS));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let msg = input.sample().to_msg();
            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(error = %e, "Input send failed");
                break;
            }
        }
    });

    // Render task: draw whatever the buffer yields now
    let render_buffer = buffer.clone();
    let render_session = session.clone();
    let render_handle = tokio::spawn(async move {
        let mut ticker = interval(Duration::from_millis(RENDER_INTERVAL_MS));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let frame = render_buffer.lock().frame(unix_millis());
            let config = render_session.lock().config.clone();
            renderer.draw(&frame, &config);
        }
    });

    // Reader loop
    let result = loop {
        match ws_stream.next().await {
            Some(Ok(Message::Text(text))) => match decode_server_msg(&text) {
                Ok(msg) => handle_server_msg(msg, &session, &buffer, unix_millis()),
                Err(e) => debug!(error = %e, "Dropped server message"),
            },
            Some(Ok(Message::Close(_))) | None => {
                info!("Server closed the connection");
                break Ok(());
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!(error = %e, "WebSocket error");
                break Err(e.into());
            }
        }
    };

    input_handle.abort();
    render_handle.abort();
    result
}

async fn send_msg(sink: &mut WsSink, msg: &ClientMsg) -> Result<(), ClientError> {
    let json = encode(msg)?;
    sink.send(Message::Text(json)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::sync::RenderFrame;
    use crate::ws::protocol::{decode_client_msg, decode_server_msg};

    #[test]
    fn room_url_joins_base_and_room() {
        let options = ClientOptions {
            url: "ws://localhost:8080/".to_string(),
            room: "final".to_string(),
            ..ClientOptions::default()
        };
        assert_eq!(options.room_url(), "ws://localhost:8080/ws/final");
    }

    #[test]
    fn opening_messages_for_plain_player() {
        let options = ClientOptions {
            team: Some(Team::Blue),
            ..ClientOptions::default()
        };
        let msgs = options.opening_messages();
        assert_eq!(msgs.len(), 1);
        assert!(matches!(
            msgs[0],
            ClientMsg::Join {
                team: Some(Team::Blue),
                ..
            }
        ));
    }

    #[test]
    fn opening_messages_for_host_are_valid_on_the_wire() {
        let options = ClientOptions {
            wallet: Some("W1".to_string()),
            start: true,
            duration_min: Some(1),
            team_size: Some(2),
            player_key: Some("seat-7".to_string()),
            ..ClientOptions::default()
        };
        let msgs = options.opening_messages();
        assert_eq!(msgs.len(), 3);
        assert!(matches!(
            &msgs[0],
            ClientMsg::Join {
                player_key: Some(k),
                wallet: Some(w),
                ..
            } if k == "seat-7" && w == "W1"
        ));
        for msg in &msgs {
            let json = encode(msg).unwrap();
            assert_eq!(&decode_client_msg(&json).unwrap(), msg);
        }
        assert_eq!(
            msgs[2],
            ClientMsg::Start {
                duration_min: Some(1),
                wallet: Some("W1".to_string()),
            }
        );
    }

    #[test]
    fn welcome_then_snapshot_feed_the_session_and_buffer() {
        let session = Mutex::new(Session::default());
        let buffer = SyncBuffer::shared();
        let id = Uuid::new_v4();

        let welcome = format!(
            r#"{{"type":"welcome","id":"{id}","room":"lobby","config":{}}}"#,
            serde_json::to_string(&SimConfig::default()).unwrap()
        );
        handle_server_msg(decode_server_msg(&welcome).unwrap(), &session, &buffer, 0);
        assert_eq!(session.lock().id, Some(id));
        assert_eq!(buffer.lock().frame(0), RenderFrame::Connecting);

        let snapshot = format!(
            r#"{{"type":"snapshot","t":1000,"me":"{id}","score":{{"red":0,"blue":0}},"phase":"waiting","players":{{}},"ball":{{"x":15.0,"y":8.0,"vx":0.0,"vy":0.0}},"timeLeftMs":0}}"#
        );
        handle_server_msg(decode_server_msg(&snapshot).unwrap(), &session, &buffer, 5_000);
        match buffer.lock().frame(5_200) {
            RenderFrame::Interpolated(state) => {
                assert_eq!(state.me, id);
                assert_eq!(state.ball.x, 15.0);
            }
            RenderFrame::Connecting => panic!("expected a frame"),
        };
    }
}
