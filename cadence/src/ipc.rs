//! IPC interface for Cadence

use crate::attrs::Attribute;
use crate::controller::{Controller, ControllerStatus};
use crate::display::DisplayEvent;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

/// IPC request types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IpcRequest {
    /// Get full daemon status
    GetStatus,

    /// List every attribute with its current value
    ListAttributes,

    /// Read one attribute
    GetAttribute { name: String },

    /// Write one attribute
    SetAttribute { name: String, value: String },

    /// External wake trigger
    Wake,

    /// Inject a display power event
    Display { blanked: bool },
}

/// IPC response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum IpcResponse {
    Success { data: serde_json::Value },
    Error { message: String },
}

/// Full daemon status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    pub version: String,
    pub controller: ControllerStatus,
}

/// One attribute and its current value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeValue {
    pub name: String,
    pub value: String,
    pub writable: bool,
}

/// IPC server
pub struct IpcServer {
    socket_path: String,
    controller: Controller,
}

impl IpcServer {
    pub fn new(socket_path: impl Into<String>, controller: Controller) -> Self {
        Self {
            socket_path: socket_path.into(),
            controller,
        }
    }

    /// Bind the socket, replacing a stale one
    pub fn bind(&self) -> Result<UnixListener> {
        let _ = std::fs::remove_file(&self.socket_path);

        if let Some(parent) = std::path::Path::new(&self.socket_path).parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;
        tracing::info!("Cadence IPC listening on {}", self.socket_path);
        Ok(listener)
    }

    pub async fn run(&self) -> Result<()> {
        let listener = self.bind()?;
        self.serve(listener).await
    }

    pub async fn serve(&self, listener: UnixListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let controller = self.controller.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_client(stream, controller).await {
                            tracing::error!("Client error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Accept error: {}", e);
                }
            }
        }
    }
}

async fn handle_client(stream: UnixStream, controller: Controller) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        let response = match serde_json::from_str::<IpcRequest>(&line) {
            Ok(request) => process_request(request, &controller).await,
            Err(e) => IpcResponse::Error {
                message: format!("Invalid request: {}", e),
            },
        };

        let response_json = serde_json::to_string(&response)?;
        writer.write_all(response_json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;

        line.clear();
    }

    Ok(())
}

fn success<T: Serialize>(value: T) -> IpcResponse {
    match serde_json::to_value(value) {
        Ok(data) => IpcResponse::Success { data },
        Err(e) => IpcResponse::Error {
            message: e.to_string(),
        },
    }
}

async fn process_request(request: IpcRequest, controller: &Controller) -> IpcResponse {
    match request {
        IpcRequest::GetStatus => success(DaemonStatus {
            version: env!("CARGO_PKG_VERSION").to_string(),
            controller: controller.status().await,
        }),

        IpcRequest::ListAttributes => {
            let mut attributes = Vec::with_capacity(Attribute::ALL.len());
            for attr in Attribute::ALL {
                attributes.push(AttributeValue {
                    name: attr.name().to_string(),
                    value: controller.show(attr).await,
                    writable: attr.writable(),
                });
            }
            success(attributes)
        }

        IpcRequest::GetAttribute { name } => match name.parse::<Attribute>() {
            Ok(attr) => success(AttributeValue {
                name: attr.name().to_string(),
                value: controller.show(attr).await,
                writable: attr.writable(),
            }),
            Err(e) => IpcResponse::Error {
                message: e.to_string(),
            },
        },

        IpcRequest::SetAttribute { name, value } => {
            let result = match name.parse::<Attribute>() {
                Ok(attr) => controller.store(attr, &value).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => IpcResponse::Success {
                    data: serde_json::json!({ "name": name, "value": value.trim() }),
                },
                Err(e) => IpcResponse::Error {
                    message: e.to_string(),
                },
            }
        }

        IpcRequest::Wake => {
            controller.wake().await;
            IpcResponse::Success {
                data: serde_json::json!({ "action": "wake" }),
            }
        }

        IpcRequest::Display { blanked } => {
            let event = DisplayEvent::from_blanked(blanked);
            controller.handle_display(event).await;
            success(event)
        }
    }
}

/// IPC client
pub struct IpcClient {
    socket_path: String,
}

impl IpcClient {
    pub fn new(socket_path: impl Into<String>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    pub async fn send(&self, request: IpcRequest) -> Result<IpcResponse> {
        let mut stream = UnixStream::connect(&self.socket_path).await?;

        let request_json = serde_json::to_string(&request)?;
        stream.write_all(request_json.as_bytes()).await?;
        stream.write_all(b"\n").await?;
        stream.flush().await?;

        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        reader.read_line(&mut line).await?;

        Ok(serde_json::from_str(&line)?)
    }

    async fn request<T: serde::de::DeserializeOwned>(&self, request: IpcRequest) -> Result<T> {
        match self.send(request).await? {
            IpcResponse::Success { data } => Ok(serde_json::from_value(data)?),
            IpcResponse::Error { message } => Err(anyhow::anyhow!(message)),
        }
    }

    pub async fn get_status(&self) -> Result<DaemonStatus> {
        self.request(IpcRequest::GetStatus).await
    }

    pub async fn list_attributes(&self) -> Result<Vec<AttributeValue>> {
        self.request(IpcRequest::ListAttributes).await
    }

    pub async fn get_attribute(&self, name: &str) -> Result<AttributeValue> {
        self.request(IpcRequest::GetAttribute {
            name: name.to_string(),
        })
        .await
    }

    pub async fn set_attribute(&self, name: &str, value: &str) -> Result<()> {
        match self
            .send(IpcRequest::SetAttribute {
                name: name.to_string(),
                value: value.to_string(),
            })
            .await?
        {
            IpcResponse::Success { .. } => Ok(()),
            IpcResponse::Error { message } => Err(anyhow::anyhow!(message)),
        }
    }

    pub async fn wake(&self) -> Result<()> {
        match self.send(IpcRequest::Wake).await? {
            IpcResponse::Success { .. } => Ok(()),
            IpcResponse::Error { message } => Err(anyhow::anyhow!(message)),
        }
    }

    pub async fn display(&self, blanked: bool) -> Result<DisplayEvent> {
        self.request(IpcRequest::Display { blanked }).await
    }
}
