// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

//! REST/WebSocket surface configuration.

use serde::Deserialize;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

pub(crate) const DEFAULT_BINDING_PORT: u16 = 8000;
pub(crate) const DEFAULT_BINDING_IP_ADDR: IpAddr = IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0));
/// Default cap on a serialized outbound WebSocket frame.
pub(crate) const DEFAULT_WS_MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// REST API configuration builder.
#[derive(Default, Deserialize)]
pub struct RestApiConfigBuilder {
    binding_port: Option<u16>,
    binding_ip_addr: Option<IpAddr>,
    ws_max_message_size: Option<usize>,
}

impl RestApiConfigBuilder {
    /// Creates a new config builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the binding port for the REST API.
    pub fn binding_port(mut self, port: u16) -> Self {
        self.binding_port.replace(port);
        self
    }

    /// Sets the binding IP address for the REST API.
    pub fn binding_ip_addr(mut self, addr: IpAddr) -> Self {
        self.binding_ip_addr.replace(addr);
        self
    }

    /// Sets the maximum serialized size of an outbound WebSocket frame.
    pub fn ws_max_message_size(mut self, size: usize) -> Self {
        self.ws_max_message_size.replace(size);
        self
    }

    /// Builds the REST API config.
    pub fn finish(self) -> RestApiConfig {
        let binding_socket_addr = SocketAddr::new(
            self.binding_ip_addr.unwrap_or(DEFAULT_BINDING_IP_ADDR),
            self.binding_port.unwrap_or(DEFAULT_BINDING_PORT),
        );

        RestApiConfig {
            binding_socket_addr,
            ws_max_message_size: self.ws_max_message_size.unwrap_or(DEFAULT_WS_MAX_MESSAGE_SIZE),
        }
    }
}

/// REST API configuration.
#[derive(Clone)]
pub struct RestApiConfig {
    pub(crate) binding_socket_addr: SocketAddr,
    pub(crate) ws_max_message_size: usize,
}

impl RestApiConfig {
    /// Returns a builder for this config.
    pub fn build() -> RestApiConfigBuilder {
        RestApiConfigBuilder::new()
    }

    /// Returns the binding address.
    pub fn binding_socket_addr(&self) -> SocketAddr {
        self.binding_socket_addr
    }

    /// Returns the outbound WebSocket frame cap in bytes.
    pub fn ws_max_message_size(&self) -> usize {
        self.ws_max_message_size
    }
}

impl Default for RestApiConfig {
    fn default() -> Self {
        RestApiConfigBuilder::new().finish()
    }
}
