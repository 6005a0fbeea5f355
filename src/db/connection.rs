use tiberius::{Client, Config};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use crate::error::{DbError, DbResult};

pub type SqlClient = Client<Compat<TcpStream>>;

/// A single, unpooled connection. Opened per tool call and closed afterwards.
pub struct DatabaseConnection {
    client: SqlClient,
}

impl DatabaseConnection {
    pub async fn open(connection_string: &str) -> DbResult<Self> {
        let config = parse_connection_string(connection_string)?;

        let tcp = TcpStream::connect(config.get_addr()).await?;
        tcp.set_nodelay(true)?;

        let client = match Client::connect(config.clone(), tcp.compat_write()).await {
            Ok(client) => client,
            // Azure SQL gateways may redirect to the node that owns the database
            Err(tiberius::error::Error::Routing { host, port }) => {
                tracing::debug!(%host, port, "SQL Server redirected connection");
                let mut config = config;
                config.host(&host);
                config.port(port);

                let tcp = TcpStream::connect(config.get_addr()).await?;
                tcp.set_nodelay(true)?;
                Client::connect(config, tcp.compat_write()).await?
            }
            Err(e) => return Err(e.into()),
        };

        tracing::debug!("Connected to SQL Server");
        Ok(Self { client })
    }

    pub fn client(&mut self) -> &mut SqlClient {
        &mut self.client
    }

    pub async fn close(self) -> DbResult<()> {
        self.client.close().await?;
        Ok(())
    }
}

/// Accepts ADO.NET, ODBC and JDBC style connection strings.
pub fn parse_connection_string(raw: &str) -> DbResult<Config> {
    let raw = raw.trim();

    let parsed = if raw
        .get(..5)
        .map_or(false, |prefix| prefix.eq_ignore_ascii_case("jdbc:"))
    {
        Config::from_jdbc_string(raw)
    } else if raw.to_ascii_lowercase().contains("driver=") {
        Config::from_ado_string(&odbc_to_ado(raw))
    } else {
        Config::from_ado_string(raw)
    };

    parsed.map_err(|e| DbError::InvalidConnectionString(e.to_string()))
}

/// Rewrite an ODBC connection string (as used by pyodbc and friends) into the
/// ADO.NET dialect: the `Driver` key is dropped, `{...}` values are unwrapped,
/// and ODBC-only key names and yes/no flags are translated.
fn odbc_to_ado(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());

    for (key, value) in split_odbc_pairs(raw) {
        let key = key.trim().to_ascii_lowercase();
        let key = match key.as_str() {
            "driver" => continue,
            "uid" => "user id",
            "pwd" => "password",
            other => other,
        };

        let value = match (key, value.trim().to_ascii_lowercase().as_str()) {
            ("encrypt" | "trustservercertificate", "yes") => "true".to_string(),
            ("encrypt" | "trustservercertificate", "no") => "false".to_string(),
            _ => value.trim().to_string(),
        };

        out.push_str(key);
        out.push('=');
        if value.contains(';') || value.contains('"') || value.contains('=') {
            out.push('"');
            out.push_str(&value.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(&value);
        }
        out.push(';');
    }

    out
}

/// Split `key=value;` pairs, honoring ODBC `{...}` quoting (`}}` escapes `}`).
fn split_odbc_pairs(raw: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut chars = raw.chars().peekable();

    loop {
        let mut key = String::new();
        while let Some(c) = chars.next() {
            match c {
                '=' => break,
                ';' => key.clear(),
                _ => key.push(c),
            }
        }

        if key.trim().is_empty() {
            break;
        }

        let mut value = String::new();
        if chars.peek() == Some(&'{') {
            chars.next();
            while let Some(c) = chars.next() {
                if c == '}' {
                    if chars.peek() == Some(&'}') {
                        chars.next();
                        value.push('}');
                    } else {
                        break;
                    }
                } else {
                    value.push(c);
                }
            }
            // skip to the separator
            for c in chars.by_ref() {
                if c == ';' {
                    break;
                }
            }
        } else {
            for c in chars.by_ref() {
                if c == ';' {
                    break;
                }
                value.push(c);
            }
        }

        pairs.push((key, value));
    }

    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ado_strings() {
        let config =
            parse_connection_string("server=tcp:db.example.com,1433;user=sa;password=secret")
                .unwrap();
        assert_eq!(config.get_addr(), "db.example.com:1433");
    }

    #[test]
    fn parses_jdbc_strings() {
        let config = parse_connection_string(
            "jdbc:sqlserver://localhost:1433;databaseName=master;user=sa;password=secret",
        )
        .unwrap();
        assert_eq!(config.get_addr(), "localhost:1433");
    }

    #[test]
    fn parses_odbc_strings() {
        let raw = "Driver={ODBC Driver 18 for SQL Server};Server=tcp:myserver.database.windows.net,1433;\
                   Database=sales;Uid=reader;Pwd={p;a}}ss};Encrypt=yes;TrustServerCertificate=no;";
        let config = parse_connection_string(raw).unwrap();
        assert_eq!(config.get_addr(), "myserver.database.windows.net:1433");
    }

    #[test]
    fn odbc_pairs_are_rewritten() {
        let ado = odbc_to_ado("Driver={ODBC Driver 18};Uid=reader;Pwd={p;a}}ss};Encrypt=yes");
        assert_eq!(ado, "user id=reader;password=\"p;a}ss\";encrypt=true;");
    }

    #[test]
    fn odbc_split_tolerates_stray_separators() {
        let pairs = split_odbc_pairs(";;Server=x;;Database=y;");
        assert_eq!(
            pairs,
            vec![
                ("Server".to_string(), "x".to_string()),
                ("Database".to_string(), "y".to_string()),
            ]
        );
    }
}
