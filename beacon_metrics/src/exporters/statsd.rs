use beacon_config::StatsdConfig;
use beacon_core::{async_trait, MetricEvent, MetricKind, MetricSink, PipelineError, Result};
use rand::Rng;
use std::fmt::Write as _;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

// characters that would end a field early; replaced with `_`
const NAME_RESERVED: &[char] = &['|', ':', ',', '@', '#', '\n', '\r'];
const TAG_RESERVED: &[char] = &['|', ',', '\n', '\r'];

/// Sends batches to a DogStatsD agent over UDP.
///
/// Lines look like `<namespace><name>:<value>|<type>[|@<rate>][|#<tags>]` and
/// are packed newline-separated into datagrams of at most
/// `max_payload_bytes`. Names and tags have the line's separator characters
/// replaced with `_`; a tag keeps its `key:value` colon.
pub struct StatsdSink {
    endpoint: String,
    namespace: String,
    constant_tags: Vec<String>,
    max_payload_bytes: usize,
    socket: Option<UdpSocket>,
}

impl StatsdSink {
    pub fn new(config: &StatsdConfig) -> Self {
        Self {
            endpoint: config.endpoint(),
            namespace: config.namespace.clone(),
            constant_tags: Vec::new(),
            max_payload_bytes: config.max_payload_bytes,
            socket: None,
        }
    }

    /// Tags prepended to every line, ahead of the event's own tags.
    pub fn with_constant_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.constant_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn encode(&self, event: &MetricEvent) -> String {
        let mut line = String::with_capacity(64);
        push_escaped(&mut line, &self.namespace, NAME_RESERVED);
        push_escaped(&mut line, event.name(), NAME_RESERVED);
        line.push(':');

        match event.kind() {
            MetricKind::Count => {
                let _ = write!(line, "{}", event.value() as i64);
            }
            MetricKind::Gauge | MetricKind::Histogram => {
                let _ = write!(line, "{}", event.value());
            }
        }
        let _ = write!(line, "|{}", event.kind().statsd_code());

        if event.sample_rate() < 1.0 {
            let _ = write!(line, "|@{}", event.sample_rate());
        }

        let mut tags = self.constant_tags.iter().chain(event.tags()).peekable();
        if tags.peek().is_some() {
            line.push_str("|#");
            for (i, tag) in tags.enumerate() {
                if i > 0 {
                    line.push(',');
                }
                push_escaped(&mut line, tag, TAG_RESERVED);
            }
        }

        line
    }

    /// Groups lines into payloads no larger than `max_payload_bytes`. A
    /// single oversized line is sent on its own.
    fn pack(&self, lines: &[String]) -> Vec<String> {
        let mut payloads = Vec::new();
        let mut current = String::new();

        for line in lines {
            if !current.is_empty() && current.len() + 1 + line.len() > self.max_payload_bytes {
                payloads.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(line);
        }

        if !current.is_empty() {
            payloads.push(current);
        }
        payloads
    }
}

fn push_escaped(line: &mut String, raw: &str, reserved: &[char]) {
    line.extend(raw.chars().map(|c| if reserved.contains(&c) { '_' } else { c }));
}

fn sampled_in(event: &MetricEvent) -> bool {
    event.sample_rate() >= 1.0 || rand::thread_rng().gen_bool(event.sample_rate())
}

#[async_trait]
impl MetricSink for StatsdSink {
    fn name(&self) -> &str {
        "statsd"
    }

    async fn connect(&mut self) -> Result<()> {
        let addr = tokio::net::lookup_host(&self.endpoint)
            .await
            .map_err(|e| PipelineError::SinkUnavailable(format!("{}: {}", self.endpoint, e)))?
            .next()
            .ok_or_else(|| {
                PipelineError::SinkUnavailable(format!("{}: no address found", self.endpoint))
            })?;

        let bind = if addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind)
            .await
            .map_err(|e| PipelineError::SinkUnavailable(e.to_string()))?;
        socket
            .connect(addr)
            .await
            .map_err(|e| PipelineError::SinkUnavailable(format!("{}: {}", addr, e)))?;

        info!(endpoint = %self.endpoint, "Connected to statsd agent");
        self.socket = Some(socket);
        Ok(())
    }

    /// Sends every datagram even if some fail, so a batch can be partly
    /// delivered. The error then says how many datagrams were lost.
    async fn emit_batch(&mut self, events: &[MetricEvent]) -> Result<()> {
        let socket = self
            .socket
            .as_ref()
            .ok_or_else(|| PipelineError::Emit("statsd sink is not connected".to_string()))?;

        let lines: Vec<String> = events
            .iter()
            .filter(|event| sampled_in(event))
            .map(|event| self.encode(event))
            .collect();

        let payloads = self.pack(&lines);
        let mut failed = 0;
        let mut first_error = None;

        for payload in &payloads {
            if let Err(e) = socket.send(payload.as_bytes()).await {
                warn!(bytes = payload.len(), error = %e, "statsd datagram not sent");
                failed += 1;
                first_error.get_or_insert(e);
            }
        }

        if let Some(e) = first_error {
            return Err(PipelineError::Emit(format!(
                "statsd send failed for {} of {} datagrams: {}",
                failed,
                payloads.len(),
                e
            )));
        }

        debug!(lines = lines.len(), datagrams = payloads.len(), "Sent statsd batch");
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.socket = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink() -> StatsdSink {
        StatsdSink::new(&StatsdConfig::default()).with_constant_tags(["env:test", "version:1.2.3"])
    }

    #[test]
    fn test_encode_lines() {
        let sink = sink();

        let count = MetricEvent::count("http.request.count", 3.9).with_tag("status", 200);
        assert_eq!(
            sink.encode(&count),
            "app.http.request.count:3|c|#env:test,version:1.2.3,status:200"
        );

        let gauge = MetricEvent::gauge("http.request.duration", 12.5);
        assert_eq!(
            sink.encode(&gauge),
            "app.http.request.duration:12.5|g|#env:test,version:1.2.3"
        );

        let histogram = MetricEvent::histogram("http.response.size", 512.0)
            .with_sample_rate(0.5)
            .unwrap();
        assert_eq!(
            sink.encode(&histogram),
            "app.http.response.size:512|h|@0.5|#env:test,version:1.2.3"
        );
    }

    #[test]
    fn test_encode_replaces_separators() {
        let sink = StatsdSink::new(&StatsdConfig::default()).with_constant_tags(["team:a|b"]);

        let event = MetricEvent::count("jobs:done|c\nfake", 1.0)
            .with_tags(vec!["queue:high,low".to_string(), "path:/a:b".to_string()]);
        assert_eq!(
            sink.encode(&event),
            "app.jobs_done_c_fake:1|c|#team:a_b,queue:high_low,path:/a:b"
        );

        let event = MetricEvent::gauge("ratio@2#x", 0.5);
        assert_eq!(sink.encode(&event), "app.ratio_2_x:0.5|g|#team:a_b");
    }

    #[test]
    fn test_encode_without_tags() {
        let sink = StatsdSink::new(&StatsdConfig {
            namespace: String::new(),
            ..StatsdConfig::default()
        });
        assert_eq!(sink.encode(&MetricEvent::gauge("up", 1.0)), "up:1|g");
    }

    #[test]
    fn test_pack_respects_payload_limit() {
        let sink = StatsdSink::new(&StatsdConfig {
            max_payload_bytes: 10,
            ..StatsdConfig::default()
        });
        let lines: Vec<String> = ["aaaa", "bbbb", "cccc", "dddddddddddd"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        assert_eq!(
            sink.pack(&lines),
            vec!["aaaa\nbbbb", "cccc", "dddddddddddd"]
        );
    }

    #[tokio::test]
    async fn test_emit_before_connect_fails() {
        let mut sink = sink();
        let result = sink.emit_batch(&[MetricEvent::count("a", 1.0)]).await;
        assert!(matches!(result, Err(PipelineError::Emit(_))));
    }

    #[tokio::test]
    async fn test_sends_batch_over_udp() {
        let agent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = agent.local_addr().unwrap().port();

        let mut sink = StatsdSink::new(&StatsdConfig {
            host: "127.0.0.1".to_string(),
            port,
            ..StatsdConfig::default()
        })
        .with_constant_tags(["env:test"]);

        sink.connect().await.unwrap();
        sink.emit_batch(&[
            MetricEvent::count("requests", 1.0),
            MetricEvent::gauge("inflight", 4.0),
        ])
        .await
        .unwrap();

        let mut buf = [0u8; 1500];
        let len = tokio::time::timeout(std::time::Duration::from_secs(2), agent.recv(&mut buf))
            .await
            .unwrap()
            .unwrap();
        let payload = std::str::from_utf8(&buf[..len]).unwrap();

        assert_eq!(payload, "app.requests:1|c|#env:test\napp.inflight:4|g|#env:test");
        sink.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_datagram_does_not_stop_batch() {
        let agent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = agent.local_addr().unwrap().port();

        let mut sink = StatsdSink::new(&StatsdConfig {
            host: "127.0.0.1".to_string(),
            port,
            max_payload_bytes: 64,
            ..StatsdConfig::default()
        });
        sink.connect().await.unwrap();

        // the middle line exceeds the largest UDP datagram and gets a packet of its own
        let result = sink
            .emit_batch(&[
                MetricEvent::gauge("first", 1.0),
                MetricEvent::gauge("x".repeat(70_000), 2.0),
                MetricEvent::gauge("last", 3.0),
            ])
            .await;

        match result {
            Err(PipelineError::Emit(message)) => assert!(message.contains("1 of 3 datagrams")),
            other => panic!("unexpected result: {:?}", other),
        }

        let mut buf = [0u8; 1500];
        let mut received = Vec::new();
        for _ in 0..2 {
            let len = tokio::time::timeout(std::time::Duration::from_secs(2), agent.recv(&mut buf))
                .await
                .unwrap()
                .unwrap();
            received.push(String::from_utf8(buf[..len].to_vec()).unwrap());
        }
        assert_eq!(received, vec!["app.first:1|g", "app.last:3|g"]);
    }
}
