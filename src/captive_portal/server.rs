//! HTTP 服务器抽象
//!
//! 控制循环是单线程的，所以服务器以“每次处理一个待处理请求”的方式
//! 被轮询，而不是由回调直接改状态。

use std::borrow::Cow;

/// 一次请求/响应交换
pub trait Exchange {
    /// 查询参数的值，不存在时为 `None`
    fn arg(&self, name: &str) -> Option<&str>;

    fn has_arg(&self, name: &str) -> bool {
        self.arg(name).is_some()
    }

    fn send(&mut self, status: u16, content_type: &str, body: &str);
}

pub trait PortalServer {
    fn begin(&mut self, port: u16) -> bool;
    /// 非阻塞：至多处理一个待处理的请求
    fn handle_client(&mut self, handler: &mut dyn FnMut(&mut dyn Exchange));
    fn stop(&mut self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub content_type: String,
    pub body: String,
}

/// 已解析好参数、等待处理器决定响应的请求
#[derive(Debug, Clone, Default)]
pub struct PendingExchange {
    uri: String,
    args: Vec<(String, String)>,
    response: Option<Response>,
}

impl PendingExchange {
    pub fn from_uri(uri: &str) -> Self {
        let query = uri.split_once('?').map(|(_, q)| q).unwrap_or("");
        Self {
            uri: uri.to_string(),
            args: parse_query(query),
            response: None,
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn response(&self) -> Option<&Response> {
        self.response.as_ref()
    }

    pub fn take_response(&mut self) -> Option<Response> {
        self.response.take()
    }
}

impl Exchange for PendingExchange {
    fn arg(&self, name: &str) -> Option<&str> {
        self.args
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn send(&mut self, status: u16, content_type: &str, body: &str) {
        self.response = Some(Response {
            status,
            content_type: content_type.to_string(),
            body: body.to_string(),
        });
    }
}

/// 解析 `application/x-www-form-urlencoded` 查询串
pub fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(key), decode_component(value))
        })
        .collect()
}

fn decode_component(raw: &str) -> String {
    let spaced: Cow<str> = if raw.contains('+') {
        Cow::Owned(raw.replace('+', " "))
    } else {
        Cow::Borrowed(raw)
    };
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => String::from_utf8_lossy(&urlencoding::decode_binary(spaced.as_bytes()))
            .into_owned(),
    }
}

#[cfg(target_os = "espidf")]
pub use esp::EspPortalServer;

#[cfg(target_os = "espidf")]
mod esp {
    use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
    use std::time::Duration;

    use esp_idf_svc::{
        http::{
            server::{Configuration, EspHttpServer},
            Method,
        },
        io::Write,
    };

    use super::{Exchange, PendingExchange, PortalServer, Response};

    /// HTTP 线程等待控制循环给出响应的最长时间
    const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

    struct Inbound {
        exchange: PendingExchange,
        reply: SyncSender<Option<Response>>,
    }

    /// 基于 `EspHttpServer` 的配网服务器
    ///
    /// esp-idf 的 httpd 在自己的线程里回调处理器，这里把请求通过通道
    /// 交给控制循环，再把控制循环决定的响应写回去。
    #[derive(Default)]
    pub struct EspPortalServer {
        server: Option<EspHttpServer<'static>>,
        inbound: Option<Receiver<Inbound>>,
    }

    impl EspPortalServer {
        pub fn new() -> Self {
            Self::default()
        }

        fn start_http_server(
            port: u16,
            tx: Sender<Inbound>,
        ) -> anyhow::Result<EspHttpServer<'static>> {
            let config = Configuration {
                http_port: port,
                stack_size: 8192,
                uri_match_wildcard: true,
                ..Default::default()
            };

            let mut server = EspHttpServer::new(&config)?;

            server.fn_handler::<anyhow::Error, _>("/*", Method::Get, move |req| {
                let (reply_tx, reply_rx) = mpsc::sync_channel(1);
                tx.send(Inbound {
                    exchange: PendingExchange::from_uri(req.uri()),
                    reply: reply_tx,
                })
                .map_err(|_| anyhow::anyhow!("portal loop is gone"))?;

                match reply_rx.recv_timeout(REPLY_TIMEOUT) {
                    Ok(Some(response)) => {
                        let headers = [("Content-Type", response.content_type.as_str())];
                        let mut resp = req.into_response(response.status, None, &headers)?;
                        resp.write_all(response.body.as_bytes())?;
                    }
                    Ok(None) => {
                        req.into_ok_response()?;
                    }
                    Err(_) => {
                        log::warn!("No reply from portal loop");
                        req.into_status_response(503)?;
                    }
                }
                Ok(())
            })?;

            Ok(server)
        }
    }

    impl PortalServer for EspPortalServer {
        fn begin(&mut self, port: u16) -> bool {
            self.stop();
            let (tx, rx) = mpsc::channel();
            match Self::start_http_server(port, tx) {
                Ok(server) => {
                    log::info!("HTTP server started on port {}", port);
                    self.server = Some(server);
                    self.inbound = Some(rx);
                    true
                }
                Err(e) => {
                    log::error!("Failed to start HTTP server: {:?}", e);
                    false
                }
            }
        }

        fn handle_client(&mut self, handler: &mut dyn FnMut(&mut dyn Exchange)) {
            let Some(inbound) = &self.inbound else {
                return;
            };
            if let Ok(mut pending) = inbound.try_recv() {
                log::debug!("Serving {}", pending.exchange.uri());
                handler(&mut pending.exchange);
                let _ = pending.reply.send(pending.exchange.take_response());
            }
        }

        fn stop(&mut self) {
            // 先丢弃接收端，httpd 线程里的 send 会立即失败
            self.inbound = None;
            if self.server.take().is_some() {
                log::info!("HTTP server stopped");
            }
        }
    }
}
