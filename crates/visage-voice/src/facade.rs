//! Synchronous facade over the async tool client.
//!
//! The voice orchestrators are plain synchronous code; this facade is the
//! only place where the two worlds meet. It owns exactly one current-thread
//! runtime, created on `connect()` and dropped on `disconnect()`, and every
//! call marshals onto it with `block_on`.

use crate::client::{ServerCommand, ToolClient};
use crate::errors::*;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::runtime::{Builder, Runtime};
use tracing::info;

/// Synchronous view of the tool server. The voice flows program against
/// this trait; production uses [`SyncToolFacade`], tests use scripted
/// implementations.
pub trait ToolSurface {
    fn recognize_face(
        &mut self,
        access_token: &str,
        image_data: &str,
        confidence_threshold: f32,
    ) -> Result<Value>;

    fn register_user(
        &mut self,
        access_token: &str,
        name: &str,
        image_data: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<Value>;

    fn get_user_profile(&mut self, access_token: &str, user_id: &str) -> Result<Value>;

    fn list_users(&mut self, access_token: &str, limit: usize, offset: usize) -> Result<Value>;

    fn update_user(
        &mut self,
        access_token: &str,
        user_id: &str,
        name: Option<&str>,
        metadata: Option<&BTreeMap<String, String>>,
    ) -> Result<Value>;

    fn delete_user(&mut self, access_token: &str, user_id: &str) -> Result<Value>;

    fn get_database_stats(&mut self, access_token: &str) -> Result<Value>;

    fn get_health_status(&mut self, access_token: &str) -> Result<Value>;
}

/// Synchronous wrapper owning the tool client and its event loop.
pub struct SyncToolFacade {
    runtime: Option<Runtime>,
    client: Option<ToolClient>,
}

impl SyncToolFacade {
    /// Spawn the server process and connect.
    pub fn connect(command: &ServerCommand) -> Result<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(VoiceError::Io)?;

        let client = runtime.block_on(ToolClient::spawn(command))?;
        info!("Tool facade connected");

        Ok(Self {
            runtime: Some(runtime),
            client: Some(client),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    /// Shut the server down and drop the runtime. Safe to call twice.
    pub fn disconnect(&mut self) {
        if let (Some(runtime), Some(client)) = (self.runtime.as_ref(), self.client.take()) {
            let _ = runtime.block_on(client.shutdown());
            info!("Tool facade disconnected");
        }
        self.runtime = None;
    }

    /// Split out the runtime and client borrows, or fail if disconnected.
    fn parts(&mut self) -> Result<(&Runtime, &mut ToolClient)> {
        match (self.runtime.as_ref(), self.client.as_mut()) {
            (Some(runtime), Some(client)) => Ok((runtime, client)),
            _ => Err(VoiceError::NotConnected),
        }
    }
}

impl ToolSurface for SyncToolFacade {
    fn recognize_face(
        &mut self,
        access_token: &str,
        image_data: &str,
        confidence_threshold: f32,
    ) -> Result<Value> {
        let (runtime, client) = self.parts()?;
        runtime.block_on(client.recognize_face(access_token, image_data, confidence_threshold))
    }

    fn register_user(
        &mut self,
        access_token: &str,
        name: &str,
        image_data: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<Value> {
        let (runtime, client) = self.parts()?;
        runtime.block_on(client.register_user(access_token, name, image_data, metadata))
    }

    fn get_user_profile(&mut self, access_token: &str, user_id: &str) -> Result<Value> {
        let (runtime, client) = self.parts()?;
        runtime.block_on(client.get_user_profile(access_token, user_id))
    }

    fn list_users(&mut self, access_token: &str, limit: usize, offset: usize) -> Result<Value> {
        let (runtime, client) = self.parts()?;
        runtime.block_on(client.list_users(access_token, limit, offset))
    }

    fn update_user(
        &mut self,
        access_token: &str,
        user_id: &str,
        name: Option<&str>,
        metadata: Option<&BTreeMap<String, String>>,
    ) -> Result<Value> {
        let (runtime, client) = self.parts()?;
        runtime.block_on(client.update_user(access_token, user_id, name, metadata))
    }

    fn delete_user(&mut self, access_token: &str, user_id: &str) -> Result<Value> {
        let (runtime, client) = self.parts()?;
        runtime.block_on(client.delete_user(access_token, user_id))
    }

    fn get_database_stats(&mut self, access_token: &str) -> Result<Value> {
        let (runtime, client) = self.parts()?;
        runtime.block_on(client.get_database_stats(access_token))
    }

    fn get_health_status(&mut self, access_token: &str) -> Result<Value> {
        let (runtime, client) = self.parts()?;
        runtime.block_on(client.get_health_status(access_token))
    }
}

impl Drop for SyncToolFacade {
    fn drop(&mut self) {
        self.disconnect();
    }
}
