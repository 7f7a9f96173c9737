//! Redis proxy store client.
//!
//! Wraps one synchronous `redis::Connection` and issues one command at a
//! time:
//!
//! ```text
//! connect        → [AUTH password] → [SELECT db]
//! get            → GET key
//! keys_matching  → KEYS pattern
//! range_by_score → ZRANGEBYSCORE key min max WITHSCORES
//! set            → SET key value
//! ping           → PING   (expects PONG)
//! ```
//!
//! A connection that failed mid-command may still carry the late reply, so
//! any failure other than a reply type mismatch drops it. The next command
//! opens a fresh connection; the failed command is not retried.

use std::time::Duration;

use redis::{Commands, ErrorKind, IntoConnectionInfo, RedisError};
use tracing::{debug, info, warn};

use crate::ProxyStore;
use crate::error::{StoreError, StoreResult};

/// Where and how to connect.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub host: String,
    pub port: u16,
    pub db: i64,
    pub password: Option<String>,
    pub tls: bool,
    pub connect_timeout: Duration,
    pub io_timeout: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            db: 0,
            password: None,
            tls: false,
            connect_timeout: Duration::from_secs(5),
            io_timeout: Duration::from_secs(5),
        }
    }
}

impl ConnectOptions {
    fn url(&self) -> String {
        let scheme = if self.tls { "rediss" } else { "redis" };
        if self.host.contains(':') {
            format!("{scheme}://[{}]:{}/", self.host, self.port)
        } else {
            format!("{scheme}://{}:{}/", self.host, self.port)
        }
    }

    /// Connection info with credentials set directly, so passwords need no
    /// URL escaping.
    fn connection_info(&self) -> StoreResult<redis::ConnectionInfo> {
        let mut info = self
            .url()
            .into_connection_info()
            .map_err(|e| StoreError::Connect(format!("invalid address: {e}")))?;
        info.redis.db = self.db;
        info.redis.password = self.password.clone();
        Ok(info)
    }
}

/// A [`ProxyStore`] backed by a Redis server.
pub struct RedisStore {
    client: redis::Client,
    opts: ConnectOptions,
    conn: Option<redis::Connection>,
    closed: bool,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("host", &self.opts.host)
            .field("port", &self.opts.port)
            .field("connected", &self.conn.is_some())
            .finish()
    }
}

impl RedisStore {
    /// Connect, authenticate and select the database.
    pub fn connect(opts: &ConnectOptions) -> StoreResult<Self> {
        if opts.tls {
            // rustls needs a process-wide crypto provider before the handshake.
            let _ = rustls::crypto::ring::default_provider().install_default();
        }
        let client = redis::Client::open(opts.connection_info()?)
            .map_err(|e| StoreError::Connect(e.to_string()))?;
        let mut store = Self {
            client,
            opts: opts.clone(),
            conn: None,
            closed: false,
        };
        store.conn = Some(store.open()?);
        debug!(host = %opts.host, port = opts.port, db = opts.db, tls = opts.tls, "connected to proxy store");
        Ok(store)
    }

    fn open(&self) -> StoreResult<redis::Connection> {
        let conn = self
            .client
            .get_connection_with_timeout(self.opts.connect_timeout)
            .map_err(|e| StoreError::Connect(e.to_string()))?;
        conn.set_read_timeout(Some(self.opts.io_timeout))
            .and_then(|_| conn.set_write_timeout(Some(self.opts.io_timeout)))
            .map_err(|e| StoreError::Connect(format!("set io timeout: {e}")))?;
        Ok(conn)
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    fn command<T>(
        &mut self,
        name: &str,
        op: impl FnOnce(&mut redis::Connection) -> redis::RedisResult<T>,
    ) -> StoreResult<T> {
        if self.closed {
            return Err(StoreError::Io("connection is closed".to_string()));
        }
        if self.conn.is_none() {
            let conn = self.open()?;
            info!(host = %self.opts.host, port = self.opts.port, "reopened proxy store connection");
            self.conn = Some(conn);
        }
        let Some(conn) = self.conn.as_mut() else {
            return Err(StoreError::Io("connection is closed".to_string()));
        };

        op(conn).map_err(|e| {
            if e.kind() != ErrorKind::TypeError {
                warn!(command = name, error = %e, "dropping proxy store connection");
                self.conn = None;
            }
            map_error(e)
        })
    }
}

fn map_error(e: RedisError) -> StoreError {
    if e.is_io_error() {
        StoreError::Io(e.to_string())
    } else if e.kind() == ErrorKind::TypeError {
        StoreError::Protocol(e.to_string())
    } else {
        StoreError::Server(e.to_string())
    }
}

fn score_bound(v: f64) -> String {
    if v == f64::INFINITY {
        "+inf".to_string()
    } else if v == f64::NEG_INFINITY {
        "-inf".to_string()
    } else {
        v.to_string()
    }
}

impl ProxyStore for RedisStore {
    fn get(&mut self, key: &str) -> StoreResult<Option<String>> {
        self.command("GET", |conn| conn.get(key))
    }

    fn keys_matching(&mut self, pattern: &str) -> StoreResult<Vec<String>> {
        self.command("KEYS", |conn| conn.keys(pattern))
    }

    fn range_by_score(
        &mut self,
        key: &str,
        min: f64,
        max: f64,
    ) -> StoreResult<Vec<(String, f64)>> {
        let (min, max) = (score_bound(min), score_bound(max));
        self.command("ZRANGEBYSCORE", |conn| {
            conn.zrangebyscore_withscores(key, min.as_str(), max.as_str())
        })
    }

    fn set(&mut self, key: &str, value: &str) -> StoreResult<()> {
        self.command("SET", |conn| conn.set(key, value))
    }

    fn ping(&mut self) -> StoreResult<()> {
        let reply: String = self.command("PING", |conn| redis::cmd("PING").query(conn))?;
        if reply == "PONG" {
            Ok(())
        } else {
            Err(StoreError::Protocol(format!("unexpected PING reply {reply:?}")))
        }
    }

    fn close(&mut self) {
        self.closed = true;
        if self.conn.take().is_some() {
            debug!("proxy store connection closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::{Arc, Mutex};

    use crate::memory::glob_match;

    type Log = Arc<Mutex<Vec<Vec<String>>>>;

    /// How the mock answers a single command.
    enum Answer {
        Reply(String),
        /// Reply only after the given delay.
        Delayed(Duration, String),
        /// Write a partial reply, then hang up.
        Truncated(String),
    }

    #[derive(Default)]
    struct MockData {
        strings: HashMap<String, String>,
        sorted: HashMap<String, Vec<(String, f64)>>,
        password: Option<&'static str>,
        delayed: HashMap<String, Duration>,
        truncated: Vec<String>,
    }

    fn read_command(reader: &mut impl BufRead) -> Option<Vec<String>> {
        let mut line = String::new();
        if reader.read_line(&mut line).ok()? == 0 {
            return None;
        }
        let count: usize = line.trim_end().strip_prefix('*')?.parse().ok()?;
        let mut args = Vec::with_capacity(count);
        for _ in 0..count {
            line.clear();
            reader.read_line(&mut line).ok()?;
            let len: usize = line.trim_end().strip_prefix('$')?.parse().ok()?;
            let mut buf = vec![0u8; len + 2];
            reader.read_exact(&mut buf).ok()?;
            buf.truncate(len);
            args.push(String::from_utf8(buf).ok()?);
        }
        Some(args)
    }

    fn bulk(s: &str) -> String {
        format!("${}\r\n{}\r\n", s.len(), s)
    }

    fn answer(data: &Mutex<MockData>, args: &[String], authed: &mut bool) -> Answer {
        let mut data = data.lock().unwrap();
        let reply = match args[0].to_ascii_uppercase().as_str() {
            "AUTH" if Some(args[args.len() - 1].as_str()) == data.password => {
                *authed = true;
                "+OK\r\n".to_string()
            }
            "AUTH" => "-WRONGPASS invalid password\r\n".to_string(),
            _ if !*authed => "-NOAUTH Authentication required.\r\n".to_string(),
            "PING" => "+PONG\r\n".to_string(),
            "GET" => {
                let value = match data.strings.get(&args[1]) {
                    Some(v) => bulk(v),
                    None => "$-1\r\n".to_string(),
                };
                if data.truncated.contains(&args[1]) {
                    return Answer::Truncated(value[..value.len() / 2].to_string());
                }
                if let Some(delay) = data.delayed.get(&args[1]) {
                    return Answer::Delayed(*delay, value);
                }
                value
            }
            "SET" => {
                data.strings.insert(args[1].clone(), args[2].clone());
                "+OK\r\n".to_string()
            }
            "KEYS" => {
                let mut keys: Vec<&String> = data
                    .strings
                    .keys()
                    .chain(data.sorted.keys())
                    .filter(|k| glob_match(&args[1], k))
                    .collect();
                keys.sort();
                let mut out = format!("*{}\r\n", keys.len());
                for k in keys {
                    out.push_str(&bulk(k));
                }
                out
            }
            "ZRANGEBYSCORE" => {
                let parse = |s: &str| match s {
                    "-inf" => f64::NEG_INFINITY,
                    "+inf" => f64::INFINITY,
                    _ => s.parse().unwrap(),
                };
                let (min, max) = (parse(&args[2]), parse(&args[3]));
                let members: Vec<&(String, f64)> = data
                    .sorted
                    .get(&args[1])
                    .map(|m| m.iter().filter(|(_, s)| *s >= min && *s <= max).collect())
                    .unwrap_or_default();
                let mut out = format!("*{}\r\n", members.len() * 2);
                for (m, s) in members {
                    out.push_str(&bulk(m));
                    out.push_str(&bulk(&s.to_string()));
                }
                out
            }
            // SELECT, CLIENT SETINFO and anything else the client sends on setup.
            _ => "+OK\r\n".to_string(),
        };
        Answer::Reply(reply)
    }

    fn serve(stream: TcpStream, data: Arc<Mutex<MockData>>, log: Log) {
        let mut writer = stream.try_clone().expect("clone stream");
        let mut reader = BufReader::new(stream);
        let mut authed = data.lock().unwrap().password.is_none();

        while let Some(args) = read_command(&mut reader) {
            log.lock().unwrap().push(args.clone());
            let reply = match answer(&data, &args, &mut authed) {
                Answer::Reply(reply) => reply,
                Answer::Delayed(delay, reply) => {
                    std::thread::sleep(delay);
                    reply
                }
                Answer::Truncated(partial) => {
                    let _ = writer.write_all(partial.as_bytes());
                    let _ = writer.shutdown(std::net::Shutdown::Both);
                    return;
                }
            };
            if writer.write_all(reply.as_bytes()).is_err() {
                return;
            }
        }
    }

    /// Mock Redis server answering from `data`; accepts any number of
    /// connections. Every received command is appended to the returned log.
    fn start_mock_server(data: MockData) -> (u16, Log) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind to random port");
        let port = listener.local_addr().expect("local addr").port();
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let data = Arc::new(Mutex::new(data));
        let server_log = Arc::clone(&log);

        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { return };
                let (data, log) = (Arc::clone(&data), Arc::clone(&server_log));
                std::thread::spawn(move || serve(stream, data, log));
            }
        });
        (port, log)
    }

    fn options(port: u16) -> ConnectOptions {
        ConnectOptions {
            port,
            connect_timeout: Duration::from_secs(2),
            io_timeout: Duration::from_secs(2),
            ..ConnectOptions::default()
        }
    }

    fn commands(log: &Log, name: &str) -> Vec<Vec<String>> {
        log.lock()
            .unwrap()
            .iter()
            .filter(|args| args[0].eq_ignore_ascii_case(name))
            .cloned()
            .collect()
    }

    #[test]
    fn get_set_keys_and_ping() {
        let data = MockData {
            strings: HashMap::from([
                ("instance:L1".to_string(), "{}".to_string()),
                ("instance:last_update".to_string(), "1".to_string()),
                ("dependency:D1".to_string(), "{}".to_string()),
            ]),
            ..MockData::default()
        };
        let (port, _log) = start_mock_server(data);
        let mut store = RedisStore::connect(&options(port)).unwrap();

        store.ping().unwrap();
        assert_eq!(store.get("instance:L1").unwrap().as_deref(), Some("{}"));
        assert_eq!(store.get("missing").unwrap(), None);
        assert_eq!(
            store.keys_matching("instance:*").unwrap(),
            vec!["instance:L1", "instance:last_update"]
        );
        store.set("anomaly_detection:is_anomaly", "false").unwrap();
        assert_eq!(
            store.get("anomaly_detection:is_anomaly").unwrap().as_deref(),
            Some("false")
        );
    }

    #[test]
    fn range_by_score_returns_members_with_scores() {
        let data = MockData {
            sorted: HashMap::from([(
                "performance:P1:function_execution_time".to_string(),
                vec![
                    ("10:0.5".to_string(), 10.0),
                    ("20:0.75".to_string(), 20.0),
                    ("30:1.5".to_string(), 30.0),
                ],
            )]),
            ..MockData::default()
        };
        let (port, log) = start_mock_server(data);
        let mut store = RedisStore::connect(&options(port)).unwrap();

        let members = store
            .range_by_score("performance:P1:function_execution_time", 15.0, 30.0)
            .unwrap();
        assert_eq!(
            members,
            vec![("20:0.75".to_string(), 20.0), ("30:1.5".to_string(), 30.0)]
        );
        let all = store
            .range_by_score("performance:P1:function_execution_time", f64::NEG_INFINITY, f64::INFINITY)
            .unwrap();
        assert_eq!(all.len(), 3);

        let ranges = commands(&log, "ZRANGEBYSCORE");
        assert_eq!(ranges[0][4], "WITHSCORES");
        assert_eq!(ranges[1][2], "-inf");
        assert_eq!(ranges[1][3], "+inf");
    }

    #[test]
    fn connect_authenticates_and_selects_db() {
        let (port, log) = start_mock_server(MockData {
            password: Some("hunter2"),
            ..MockData::default()
        });
        let mut opts = options(port);
        opts.password = Some("hunter2".to_string());
        opts.db = 3;
        let mut store = RedisStore::connect(&opts).unwrap();
        store.ping().unwrap();

        let auth = commands(&log, "AUTH");
        assert_eq!(auth[0].last().map(String::as_str), Some("hunter2"));
        assert_eq!(commands(&log, "SELECT")[0], vec!["SELECT", "3"]);
    }

    #[test]
    fn wrong_password_fails_connect() {
        let (port, _log) = start_mock_server(MockData {
            password: Some("hunter2"),
            ..MockData::default()
        });
        let mut opts = options(port);
        opts.password = Some("wrong".to_string());
        assert!(matches!(RedisStore::connect(&opts), Err(StoreError::Connect(_))));
    }

    #[test]
    fn server_error_reply_is_surfaced() {
        let (port, _log) = start_mock_server(MockData {
            password: Some("pw"),
            ..MockData::default()
        });
        let mut store = RedisStore::connect(&options(port)).unwrap();
        assert!(matches!(store.get("x"), Err(StoreError::Server(msg)) if msg.contains("NOAUTH")));
    }

    #[test]
    fn late_reply_is_never_read_by_the_next_command() {
        let data = MockData {
            strings: HashMap::from([
                ("instance:last_update".to_string(), "MARKER".to_string()),
                ("instance:b".to_string(), "VALUE_OF_B".to_string()),
            ]),
            delayed: HashMap::from([("instance:last_update".to_string(), Duration::from_millis(600))]),
            ..MockData::default()
        };
        let (port, log) = start_mock_server(data);
        let mut opts = options(port);
        opts.io_timeout = Duration::from_millis(150);
        let mut store = RedisStore::connect(&opts).unwrap();

        assert!(matches!(store.get("instance:last_update"), Err(StoreError::Io(_))));
        assert!(!store.is_connected());

        assert_eq!(store.get("instance:b").unwrap().as_deref(), Some("VALUE_OF_B"));
        assert!(store.is_connected());
        assert_eq!(commands(&log, "GET").len(), 2);
    }

    #[test]
    fn truncated_reply_drops_connection() {
        let data = MockData {
            strings: HashMap::from([
                ("instance:a".to_string(), "0123456789".to_string()),
                ("instance:b".to_string(), "VALUE_OF_B".to_string()),
            ]),
            truncated: vec!["instance:a".to_string()],
            ..MockData::default()
        };
        let (port, _log) = start_mock_server(data);
        let mut store = RedisStore::connect(&options(port)).unwrap();

        assert!(store.get("instance:a").is_err());
        assert!(!store.is_connected());
        assert_eq!(store.get("instance:b").unwrap().as_deref(), Some("VALUE_OF_B"));
    }

    #[test]
    fn closed_store_rejects_commands() {
        let (port, _log) = start_mock_server(MockData::default());
        let mut store = RedisStore::connect(&options(port)).unwrap();
        store.close();
        assert!(matches!(store.ping(), Err(StoreError::Io(_))));
        assert!(!store.is_connected());
    }

    #[test]
    fn unreachable_server_is_connect_error() {
        let result = RedisStore::connect(&options(1));
        assert!(matches!(result, Err(StoreError::Connect(_))));
    }

    #[test]
    fn url_brackets_ipv6_hosts() {
        let opts = ConnectOptions {
            host: "::1".to_string(),
            tls: true,
            ..ConnectOptions::default()
        };
        assert_eq!(opts.url(), "rediss://[::1]:6379/");
        assert_eq!(ConnectOptions::default().url(), "redis://127.0.0.1:6379/");
    }

    #[test]
    fn password_is_carried_without_url_escaping() {
        let opts = ConnectOptions {
            password: Some("p@ss/word".to_string()),
            db: 4,
            ..ConnectOptions::default()
        };
        let info = opts.connection_info().unwrap();
        assert_eq!(info.redis.password.as_deref(), Some("p@ss/word"));
        assert_eq!(info.redis.db, 4);
    }
}
