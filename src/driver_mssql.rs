use futures_util::StreamExt;
use std::time::Duration;
use tiberius::{AuthMethod, ColumnData, Config, QueryItem, SqlBrowser};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use crate::models::enums::CredentialMode;
use crate::models::structs::ResultTable;

pub type MssqlClient = tiberius::Client<Compat<TcpStream>>;

/// The database list offered for selection after a server connect. Same
/// system/reporting exclusions SSMS users expect.
pub const DB_LIST_QUERY: &str = "SELECT name FROM sys.databases WHERE name NOT IN \
    ('ASPNETDB', 'ASPSTATE', 'master', 'tempdb', 'model', 'msdb', 'ReportServer', 'ReportServerTempDB') \
    ORDER BY name;";

/// Everything needed to open one connection to one (server, database).
#[derive(Clone, Debug)]
pub struct MssqlTargetConfig {
    /// `host`, `host,port` or `host\instance[,port]`.
    pub server: String,
    /// Initial catalog; empty connects to the login default.
    pub database: String,
    pub credential: CredentialMode,
    pub connect_timeout: Duration,
}

#[derive(Clone, Debug, PartialEq)]
struct ServerAddr {
    host: String,
    /// Explicit port; absent for the default or a browser lookup.
    port: Option<u16>,
    instance: Option<String>,
}

fn parse_server(server: &str) -> ServerAddr {
    let (endpoint, port) = match server.split_once(',') {
        Some((endpoint, port)) => (endpoint, port.trim().parse().ok()),
        None => (server, None),
    };
    let (host, instance) = match endpoint.split_once('\\') {
        Some((host, instance)) if !instance.trim().is_empty() => {
            (host, Some(instance.trim().to_string()))
        }
        _ => (endpoint, None),
    };
    ServerAddr {
        host: host.trim().to_string(),
        port,
        instance,
    }
}

fn build_config(cfg: &MssqlTargetConfig) -> Result<(Config, ServerAddr), String> {
    let addr = parse_server(&cfg.server);
    let mut config = Config::new();
    config.host(addr.host.clone());
    if let Some(port) = addr.port {
        config.port(port);
    }
    if let Some(instance) = &addr.instance {
        config.instance_name(instance.clone());
    }
    config.application_name("Multi Sql");
    config.trust_cert(); // most targets run self-signed certs
    if !cfg.database.is_empty() {
        config.database(cfg.database.clone());
    }

    match &cfg.credential {
        CredentialMode::SqlServer { user, password } => {
            config.authentication(AuthMethod::sql_server(user.clone(), password.clone()));
        }
        CredentialMode::Integrated => {
            #[cfg(windows)]
            {
                config.authentication(AuthMethod::Integrated);
            }
            #[cfg(not(windows))]
            {
                return Err("Integrated security is only available on Windows.".to_string());
            }
        }
    }

    Ok((config, addr))
}

/// Open a connection, TCP dial and TDS handshake each bounded by the
/// configured connect timeout. A named instance without an explicit port
/// goes through the SQL Browser service to find its port.
pub async fn connect(cfg: &MssqlTargetConfig) -> Result<MssqlClient, String> {
    let (config, addr) = build_config(cfg)?;
    log::debug!(
        "Attempting connection. Server: {}, Integrated Security: {}, User: {}.",
        cfg.server,
        cfg.credential.is_integrated(),
        cfg.credential.user_name()
    );

    let tcp = if addr.instance.is_some() && addr.port.is_none() {
        tokio::time::timeout(cfg.connect_timeout, TcpStream::connect_named(&config))
            .await
            .map_err(|_| format!("Connection to {} timed out.", cfg.server))?
            .map_err(|e| e.to_string())?
    } else {
        tokio::time::timeout(
            cfg.connect_timeout,
            TcpStream::connect((addr.host.as_str(), addr.port.unwrap_or(1433))),
        )
        .await
        .map_err(|_| format!("Connection to {} timed out.", cfg.server))?
        .map_err(|e| e.to_string())?
    };
    tcp.set_nodelay(true).map_err(|e| e.to_string())?;

    let client = tokio::time::timeout(
        cfg.connect_timeout,
        tiberius::Client::connect(config, tcp.compat_write()),
    )
    .await
    .map_err(|_| format!("Handshake with {} timed out.", cfg.server))?
    .map_err(|e| e.to_string())?;
    Ok(client)
}

/// List the user databases on a freshly connected server.
pub async fn fetch_database_list(client: &mut MssqlClient) -> Result<Vec<String>, String> {
    let mut stream = client
        .simple_query(DB_LIST_QUERY)
        .await
        .map_err(|e| e.to_string())?;
    let mut databases = Vec::new();
    while let Some(item) = stream.next().await {
        if let QueryItem::Row(row) = item.map_err(|e| e.to_string())? {
            if let Some(name) = row.get::<&str, _>(0) {
                databases.push(name.to_string());
            }
        }
    }
    Ok(databases)
}

/// Run a script as one command and read every result set fully into memory.
/// Result sets are named `Table0`, `Table1`, ... in arrival order.
pub async fn execute_script(
    client: &mut MssqlClient,
    script: &str,
) -> Result<Vec<ResultTable>, String> {
    let mut tables: Vec<ResultTable> = Vec::new();
    let mut stream = client.query(script, &[]).await.map_err(|e| e.to_string())?;

    while let Some(item_res) = stream.next().await {
        match item_res.map_err(|e| e.to_string())? {
            QueryItem::Metadata(meta) => {
                let mut table = ResultTable::new(format!("Table{}", tables.len()));
                for col in meta.columns() {
                    table.push_column(col.name());
                }
                tables.push(table);
            }
            QueryItem::Row(row) => {
                let rendered: Vec<String> = row.into_iter().map(render_column_data).collect();
                if let Some(table) = tables.last_mut() {
                    table.rows.push(rendered);
                }
            }
        }
    }
    Ok(tables)
}

/// Render one cell to display text; `NULL` for every null variant.
fn render_column_data(col: ColumnData<'_>) -> String {
    match col {
        ColumnData::Bit(Some(v)) => v.to_string(),
        ColumnData::U8(Some(v)) => v.to_string(),
        ColumnData::I16(Some(v)) => v.to_string(),
        ColumnData::I32(Some(v)) => v.to_string(),
        ColumnData::I64(Some(v)) => v.to_string(),
        ColumnData::F32(Some(v)) => v.to_string(),
        ColumnData::F64(Some(v)) => v.to_string(),
        ColumnData::String(Some(s)) => s.to_string(),
        ColumnData::Binary(Some(b)) => format!("0x{}", hex::encode(b)),
        ColumnData::Guid(Some(g)) => g.to_string(),
        ColumnData::Numeric(Some(n)) => format!("{}", n),
        ColumnData::DateTime(Some(dt)) => format!("{:?}", dt),
        ColumnData::SmallDateTime(Some(dt)) => format!("{:?}", dt),
        ColumnData::Xml(Some(x)) => x.to_string(),
        ColumnData::Time(Some(t)) => format!("{:?}", t),
        ColumnData::Date(Some(d)) => format!("{:?}", d),
        ColumnData::DateTime2(Some(dt2)) => format!("{:?}", dt2),
        ColumnData::DateTimeOffset(Some(dto)) => format!("{:?}", dto),
        ColumnData::Bit(None)
        | ColumnData::U8(None)
        | ColumnData::I16(None)
        | ColumnData::I32(None)
        | ColumnData::I64(None)
        | ColumnData::F32(None)
        | ColumnData::F64(None)
        | ColumnData::String(None)
        | ColumnData::Binary(None)
        | ColumnData::Guid(None)
        | ColumnData::Numeric(None)
        | ColumnData::DateTime(None)
        | ColumnData::SmallDateTime(None)
        | ColumnData::Xml(None)
        | ColumnData::Time(None)
        | ColumnData::Date(None)
        | ColumnData::DateTime2(None)
        | ColumnData::DateTimeOffset(None) => "NULL".to_string(),
    }
}
