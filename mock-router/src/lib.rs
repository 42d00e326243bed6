//! In-process stand-in for the router's `/cgi` endpoint.
//!
//! Speaks the same bracketed command format as the real firmware: checks the
//! `Authorization` cookie, applies each command of the batch in order against
//! an in-memory module table and answers with one section per instance plus
//! a trailing `[error]<code>` line. Processing stops at the first failing
//! command.

use std::{collections::BTreeMap, sync::Arc};

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    routing::post,
    Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use tokio::{net::TcpListener, sync::RwLock};

/// Status code for a command addressing an instance that does not exist.
pub const ERR_NO_INSTANCE: i64 = 71017;

type Fields = BTreeMap<String, String>;

const NO_INSTANCE: [u32; 6] = [0; 6];

#[derive(Debug, Default, Clone)]
struct Module {
    last_id: u32,
    instances: BTreeMap<u32, Fields>,
}

/// Emulated router state.
#[derive(Debug, Clone)]
pub struct Device {
    cookie: String,
    singletons: Vec<String>,
    /// Modules whose instances live under parent slot 1, i.e. `[1,id,0,0,0,0]`.
    nested: Vec<String>,
    modules: BTreeMap<String, Module>,
}

impl Device {
    pub fn new(username: &str, password: &str) -> Self {
        let credentials = BASE64.encode(format!("{username}:{password}"));
        Self {
            cookie: format!("Authorization=Basic {credentials}"),
            singletons: ["TC", "ARP_BIND", "STAT_CFG", "IGD_DEV_INFO"]
                .into_iter()
                .map(String::from)
                .collect(),
            nested: vec!["LAN_DHCP_STATIC_ADDR".to_string()],
            modules: BTreeMap::new(),
        }
    }

    /// Add an instance to a list module and return its id.
    pub fn insert(&mut self, module: &str, fields: &[(&str, &str)]) -> u32 {
        let fields = fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.create(module, fields)
    }

    /// Set fields on a singleton module.
    pub fn configure(&mut self, module: &str, fields: &[(&str, &str)]) {
        let entry = self
            .modules
            .entry(module.to_string())
            .or_default()
            .instances
            .entry(0)
            .or_default();
        for (k, v) in fields {
            entry.insert(k.to_string(), v.to_string());
        }
    }

    pub fn instance_count(&self, module: &str) -> usize {
        self.modules.get(module).map_or(0, |m| m.instances.len())
    }

    fn is_nested(&self, module: &str) -> bool {
        self.nested.iter().any(|s| s == module)
    }

    /// Selector the router uses to address instance `id` of `module`.
    pub fn selector(&self, module: &str, id: u32) -> [u32; 6] {
        if self.is_nested(module) {
            [1, id, 0, 0, 0, 0]
        } else {
            [id, 0, 0, 0, 0, 0]
        }
    }

    fn target(&self, module: &str, instance: &[u32; 6]) -> Option<u32> {
        let slot = if self.is_nested(module) {
            instance[1]
        } else {
            instance[0]
        };
        (slot != 0).then_some(slot)
    }

    fn is_singleton(&self, module: &str) -> bool {
        self.singletons.iter().any(|s| s == module)
    }

    fn create(&mut self, module: &str, fields: Fields) -> u32 {
        let entry = self.modules.entry(module.to_string()).or_default();
        entry.last_id += 1;
        entry.instances.insert(entry.last_id, fields);
        entry.last_id
    }

    /// Apply one command, appending its sections to `out`. Returns the router
    /// status code.
    fn apply(&mut self, command: &Incoming, out: &mut String) -> i64 {
        let assignments: Vec<(String, String)> = command
            .fields
            .iter()
            .filter_map(|line| line.split_once('='))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let is_mutate = !assignments.is_empty();
        let target = self.target(&command.module, &command.instance);

        if self.is_singleton(&command.module) {
            if is_mutate {
                self.configure(
                    &command.module,
                    &assignments
                        .iter()
                        .map(|(k, v)| (k.as_str(), v.as_str()))
                        .collect::<Vec<_>>(),
                );
            }
            let fields = self
                .modules
                .get(&command.module)
                .and_then(|m| m.instances.get(&0))
                .cloned()
                .unwrap_or_default();
            let lines = if is_mutate {
                Vec::new()
            } else {
                select(&fields, &command.fields)
            };
            push_section(out, &command.module, NO_INSTANCE, command.index, &lines);
            return 0;
        }

        match (target, is_mutate) {
            (None, true) => {
                let id = self.create(&command.module, assignments.into_iter().collect());
                let selector = self.selector(&command.module, id);
                push_section(out, &command.module, selector, command.index, &[]);
                0
            }
            (None, false) => {
                if let Some(module) = self.modules.get(&command.module) {
                    for (id, fields) in &module.instances {
                        let lines = select(fields, &command.fields);
                        let selector = self.selector(&command.module, *id);
                        push_section(out, &command.module, selector, command.index, &lines);
                    }
                }
                0
            }
            (Some(id), mutate) => {
                let Some(module) = self.modules.get_mut(&command.module) else {
                    return ERR_NO_INSTANCE;
                };
                if mutate {
                    let Some(fields) = module.instances.get_mut(&id) else {
                        return ERR_NO_INSTANCE;
                    };
                    fields.extend(assignments);
                } else if module.instances.remove(&id).is_none() {
                    return ERR_NO_INSTANCE;
                }
                // Updates and deletes do not echo an instance.
                push_section(out, &command.module, NO_INSTANCE, command.index, &[]);
                0
            }
        }
    }
}

impl Default for Device {
    fn default() -> Self {
        Self::new("admin", "admin")
    }
}

/// Requested fields as `name=value` lines, or every stored field when the
/// command names none.
fn select(fields: &Fields, requested: &[String]) -> Vec<String> {
    if requested.is_empty() {
        return fields.iter().map(|(k, v)| format!("{k}={v}")).collect();
    }
    requested
        .iter()
        .map(|name| {
            let value = fields.get(name).map(String::as_str).unwrap_or_default();
            format!("{name}={value}")
        })
        .collect()
}

fn push_section(out: &mut String, module: &str, selector: [u32; 6], index: usize, lines: &[String]) {
    let selector = selector.map(|c| c.to_string()).join(",");
    out.push_str(&format!(
        "[{module}#{selector}#0,0,0,0,0,0]{index},{}\r\n",
        lines.len()
    ));
    for line in lines {
        out.push_str(line);
        out.push_str("\r\n");
    }
}

/// One command as received on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incoming {
    pub module: String,
    pub instance: [u32; 6],
    pub index: usize,
    pub fields: Vec<String>,
}

/// Split a request body into commands. `None` on any framing error.
pub fn parse_body(body: &str) -> Option<Vec<Incoming>> {
    let mut lines = body.lines().filter(|line| !line.is_empty());
    let mut commands = Vec::new();
    while let Some(line) = lines.next() {
        let (inside, tail) = line.strip_prefix('[')?.split_once(']')?;
        let mut parts = inside.splitn(3, '#');
        let module = parts.next()?.to_string();
        let instance = parse_selector(parts.next()?)?;
        parse_selector(parts.next()?)?;

        let (index, count) = tail.split_once(',')?;
        let count: usize = count.parse().ok()?;
        let fields = (0..count)
            .map(|_| lines.next().map(str::to_string))
            .collect::<Option<Vec<_>>>()?;
        commands.push(Incoming {
            module,
            instance,
            index: index.parse().ok()?,
            fields,
        });
    }
    Some(commands)
}

fn parse_selector(text: &str) -> Option<[u32; 6]> {
    let values = text
        .split(',')
        .map(|part| part.parse().ok())
        .collect::<Option<Vec<u32>>>()?;
    values.try_into().ok()
}

pub type Db = Arc<RwLock<Device>>;

pub fn app() -> Router {
    app_with(Arc::new(RwLock::new(Device::default())))
}

/// Router over a caller-held device, so tests can inspect state afterwards.
pub fn app_with(db: Db) -> Router {
    Router::new().route("/cgi", post(cgi)).with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

pub async fn run_with(listener: TcpListener, db: Db) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with(db)).await
}

async fn cgi(State(db): State<Db>, headers: HeaderMap, body: String) -> (StatusCode, String) {
    let mut device = db.write().await;

    let cookie = headers
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if cookie != device.cookie {
        tracing::debug!("rejecting request with bad credentials");
        return (StatusCode::FORBIDDEN, String::new());
    }

    let Some(commands) = parse_body(&body) else {
        tracing::debug!("rejecting unparseable body");
        return (StatusCode::BAD_REQUEST, String::new());
    };

    let mut out = String::new();
    let mut status = 0;
    for command in &commands {
        status = device.apply(command, &mut out);
        if status != 0 {
            break;
        }
    }
    tracing::debug!(commands = commands.len(), status, "handled batch");
    out.push_str(&format!("[error]{status}\r\n"));
    (StatusCode::OK, out)
}
