//! WebSocket transport (§6.1): server-side accept, outbound snapshot/delta
//! frames, inbound control. Grounded on the teacher's `ws.rs` `WsWriter`/
//! `WsReader` split-socket wrapper — the same type-isolated reader/writer
//! shape, mirrored for the accept side (`accept_async` instead of
//! `connect_async`) since this daemon serves clients rather than dialing out.

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::WebSocketStream;

use crate::keymap::{KeyEvent, MouseEvent};

type WsStream = WebSocketStream<TcpStream>;

/// Inbound control message (§6.1 "Inbound text frames (JSON)").
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Input { data: String },
    Key { event: KeyEventWire },
    Mouse { event: MouseEventWire },
    Resize { cols: u16, rows: u16 },
    Scroll { delta: i32 },
    Selection { x: u16, y: u16, active: bool },
    Focus { focused: bool },
    ClipboardReply { kind: String, data: String },
    Ping,
}

/// JSON-friendly mirror of [`crate::keymap::KeyEvent`] for the wire.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct KeyEventWire {
    pub action: String,
    pub key: String,
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
}

impl KeyEventWire {
    pub fn into_key_event(self) -> Option<KeyEvent> {
        use crate::keymap::{Key, KeyAction, Modifiers};
        let action = match self.action.as_str() {
            "down" => KeyAction::Down,
            "up" => KeyAction::Up,
            _ => return None,
        };
        let key = match self.key.as_str() {
            "Enter" => Key::Enter,
            "Backspace" => Key::Backspace,
            "Tab" => Key::Tab,
            "Escape" => Key::Escape,
            "Delete" => Key::Delete,
            "Insert" => Key::Insert,
            "Home" => Key::Home,
            "End" => Key::End,
            "PageUp" => Key::PageUp,
            "PageDown" => Key::PageDown,
            "ArrowUp" => Key::ArrowUp,
            "ArrowDown" => Key::ArrowDown,
            "ArrowRight" => Key::ArrowRight,
            "ArrowLeft" => Key::ArrowLeft,
            s if s.len() == 1 => Key::Char(s.chars().next()?),
            s if s.starts_with('F') && s[1..].parse::<u8>().is_ok() => Key::F(s[1..].parse().ok()?),
            s => Key::Text(s.to_string()),
        };
        Some(KeyEvent {
            action,
            key,
            mods: Modifiers {
                shift: self.shift,
                ctrl: self.ctrl,
                alt: self.alt,
                meta: self.meta,
            },
        })
    }
}

/// JSON-friendly mirror of [`crate::keymap::MouseEvent`] for the wire.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct MouseEventWire {
    pub x: u16,
    pub y: u16,
    pub button: String,
    pub action: String,
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
}

impl MouseEventWire {
    pub fn into_mouse_event(self) -> Option<MouseEvent> {
        use crate::keymap::{Modifiers, MouseAction, MouseButton};
        let button = match self.button.as_str() {
            "left" => MouseButton::Left,
            "middle" => MouseButton::Middle,
            "right" => MouseButton::Right,
            "none" => MouseButton::None,
            "wheelup" => MouseButton::WheelUp,
            "wheeldown" => MouseButton::WheelDown,
            _ => return None,
        };
        let action = match self.action.as_str() {
            "press" => MouseAction::Press,
            "release" => MouseAction::Release,
            "move" => MouseAction::Move,
            _ => return None,
        };
        Some(MouseEvent {
            x: self.x,
            y: self.y,
            button,
            action,
            mods: Modifiers {
                shift: self.shift,
                ctrl: self.ctrl,
                alt: self.alt,
                meta: self.meta,
            },
        })
    }
}

/// Outbound control message.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    Pong,
    Bell,
    Title { title: String },
    Notification { title: Option<String>, body: Option<String> },
    Clipboard { kind: String, data: String },
    Error { message: String },
}

pub struct WsWriter {
    sink: futures_util::stream::SplitSink<WsStream, tungstenite::Message>,
}

impl WsWriter {
    /// Binary frames always begin with the compression flag byte (§6.1); the
    /// caller passes already-framed bytes from [`crate::codec`].
    pub async fn send_framed(&mut self, framed: Vec<u8>) -> Result<()> {
        self.sink
            .send(tungstenite::Message::Binary(framed))
            .await
            .context("websocket send_framed failed")
    }

    pub async fn send_control(&mut self, msg: &ServerMessage) -> Result<()> {
        let text = serde_json::to_string(msg).context("failed to serialize control message")?;
        self.sink
            .send(tungstenite::Message::Text(text))
            .await
            .context("websocket send_control failed")
    }

    pub async fn send_pong(&mut self, data: Vec<u8>) -> Result<()> {
        self.sink
            .send(tungstenite::Message::Pong(data))
            .await
            .context("websocket send_pong failed")
    }

    pub async fn close(&mut self) -> Result<()> {
        self.sink.close().await.context("websocket close failed")
    }
}

pub enum InboundFrame {
    Control(ClientMessage),
    Pong(Vec<u8>),
    Closed,
}

pub struct WsReader {
    stream: futures_util::stream::SplitStream<WsStream>,
}

impl WsReader {
    pub async fn recv(&mut self) -> Option<Result<InboundFrame>> {
        loop {
            match self.stream.next().await {
                Some(Ok(tungstenite::Message::Text(text))) => {
                    return Some(
                        serde_json::from_str::<ClientMessage>(&text)
                            .map(InboundFrame::Control)
                            .context("invalid control message"),
                    );
                }
                Some(Ok(tungstenite::Message::Pong(data))) => {
                    return Some(Ok(InboundFrame::Pong(data.to_vec())));
                }
                Some(Ok(tungstenite::Message::Ping(_))) => continue,
                Some(Ok(tungstenite::Message::Binary(_))) => {
                    // Clients never send binary frames in this protocol.
                    continue;
                }
                Some(Ok(tungstenite::Message::Close(_))) => return Some(Ok(InboundFrame::Closed)),
                Some(Ok(tungstenite::Message::Frame(_))) => continue,
                Some(Err(e)) => return Some(Err(anyhow::anyhow!("websocket read error: {e}"))),
                None => return None,
            }
        }
    }
}

/// Complete the server-side WebSocket handshake on an already-accepted TCP
/// connection.
pub async fn accept(stream: TcpStream) -> Result<(WsWriter, WsReader)> {
    let ws_stream = tokio_tungstenite::accept_async(stream)
        .await
        .context("websocket handshake failed")?;
    let (sink, stream) = ws_stream.split();
    Ok((WsWriter { sink }, WsReader { stream }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_message_parses_input() {
        let json = r#"{"type":"input","data":"ls\n"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        matches!(msg, ClientMessage::Input { .. });
    }

    #[test]
    fn client_message_parses_resize() {
        let json = r#"{"type":"resize","cols":80,"rows":24}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::Resize { cols, rows } => {
                assert_eq!(cols, 80);
                assert_eq!(rows, 24);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn key_event_wire_converts_named_key() {
        let wire = KeyEventWire {
            action: "down".to_string(),
            key: "Enter".to_string(),
            shift: false,
            ctrl: false,
            alt: false,
            meta: false,
        };
        let ev = wire.into_key_event().unwrap();
        assert_eq!(crate::keymap::key_to_bytes(&ev, false), b"\r".to_vec());
    }

    #[test]
    fn mouse_event_wire_converts_and_encodes() {
        use crate::grid::{MouseFormat, MouseMode};
        let wire = MouseEventWire {
            x: 4,
            y: 2,
            button: "left".to_string(),
            action: "press".to_string(),
            shift: false,
            ctrl: false,
            alt: false,
            meta: false,
        };
        let ev = wire.into_mouse_event().unwrap();
        assert_eq!(
            crate::keymap::mouse_to_bytes(&ev, MouseMode::Normal, MouseFormat::Sgr),
            b"\x1b[<0;5;3M".to_vec()
        );
    }

    #[test]
    fn mouse_event_wire_rejects_unknown_button() {
        let wire = MouseEventWire {
            x: 0,
            y: 0,
            button: "stylus".to_string(),
            action: "press".to_string(),
            shift: false,
            ctrl: false,
            alt: false,
            meta: false,
        };
        assert!(wire.into_mouse_event().is_none());
    }

    #[test]
    fn server_message_serializes_with_tag() {
        let msg = ServerMessage::Bell;
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"bell"}"#);
    }
}
