//! Account directory backed by the RouterOS API (`/ip/hotspot/user`).

use super::protocol::{read_sentence, write_sentence, Command, Reply, ReplyKind};
use super::{AccountDirectory, DirectoryConnector};
use crate::config::Target;
use crate::error::DirectoryError;
use crate::reconcile::AccountFilter;
use crate::types::{Account, NewAccount};
use async_trait::async_trait;
use std::net::IpAddr;
use tokio::io::BufStream;
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// Plain-text API port.
pub const DEFAULT_API_PORT: u16 = 8728;

const USER_PRINT: &str = "/ip/hotspot/user/print";
const USER_REMOVE: &str = "/ip/hotspot/user/remove";
const USER_ADD: &str = "/ip/hotspot/user/add";

/// Opens authenticated RouterOS API sessions.
#[derive(Debug, Clone, Default)]
pub struct RouterOsConnector;

impl RouterOsConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DirectoryConnector for RouterOsConnector {
    async fn connect(
        &self,
        target: &Target,
        filter: &AccountFilter,
    ) -> Result<Box<dyn AccountDirectory>, DirectoryError> {
        let session = RouterOsSession::connect(
            &target.device_address,
            &target.device_username,
            &target.device_password,
            filter.clone(),
        )
        .await?;
        Ok(Box::new(session))
    }
}

/// `host`, `host:port`, `ipv6` or `[ipv6]:port` to a connectable address.
pub fn socket_address(address: &str) -> Result<String, DirectoryError> {
    let address = address.trim();
    if address.is_empty() {
        return Err(DirectoryError::InvalidAddress(address.to_string()));
    }

    if let Ok(ip) = address.parse::<IpAddr>() {
        return Ok(match ip {
            IpAddr::V4(v4) => format!("{}:{}", v4, DEFAULT_API_PORT),
            IpAddr::V6(v6) => format!("[{}]:{}", v6, DEFAULT_API_PORT),
        });
    }

    match address.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => {
            port.parse::<u16>()
                .map_err(|_| DirectoryError::InvalidAddress(address.to_string()))?;
            Ok(address.to_string())
        }
        Some(_) => Err(DirectoryError::InvalidAddress(address.to_string())),
        None => Ok(format!("{}:{}", address, DEFAULT_API_PORT)),
    }
}

/// One logged-in API connection.
#[derive(Debug)]
pub struct RouterOsSession {
    stream: BufStream<TcpStream>,
    address: String,
    filter: AccountFilter,
    /// Set after an i/o or framing error; the stream position is no longer trustworthy
    broken: bool,
}

impl RouterOsSession {
    pub async fn connect(
        address: &str,
        username: &str,
        password: &str,
        filter: AccountFilter,
    ) -> Result<Self, DirectoryError> {
        let address = socket_address(address)?;
        let tcp = TcpStream::connect(&address)
            .await
            .map_err(|source| DirectoryError::Connect {
                address: address.clone(),
                source,
            })?;
        tcp.set_nodelay(true)?;

        let mut session = Self {
            stream: BufStream::new(tcp),
            address,
            filter,
            broken: false,
        };
        session.login(username, password).await?;
        Ok(session)
    }

    async fn login(&mut self, username: &str, password: &str) -> Result<(), DirectoryError> {
        let command = Command::new("/login")
            .attr("name", username)
            .attr("password", password);

        let done = match self.call(&command).await {
            Ok((_, done)) => done,
            Err(DirectoryError::Rejected { message, .. }) => {
                return Err(DirectoryError::Authentication(message))
            }
            Err(e) => return Err(e),
        };

        if done.get("ret").is_some() {
            return Err(DirectoryError::Authentication(
                "device requires challenge-response login (RouterOS before 6.43)".to_string(),
            ));
        }

        debug!(address = %self.address, "Logged in to device");
        Ok(())
    }

    /// Send a command and collect data rows until `!done`.
    async fn call(&mut self, command: &Command) -> Result<(Vec<Reply>, Reply), DirectoryError> {
        if self.broken {
            return Err(DirectoryError::Protocol(
                "session is unusable after an earlier failure".to_string(),
            ));
        }

        let result = self.exchange(command).await;
        if let Err(
            DirectoryError::Io(_) | DirectoryError::Protocol(_) | DirectoryError::Fatal(_),
        ) = &result
        {
            self.broken = true;
        }
        result
    }

    async fn exchange(&mut self, command: &Command) -> Result<(Vec<Reply>, Reply), DirectoryError> {
        write_sentence(&mut self.stream, &command.words()[..]).await?;

        let mut rows = Vec::new();
        let mut trap: Option<Reply> = None;
        loop {
            let words = read_sentence(&mut self.stream).await?;
            if words.is_empty() {
                continue;
            }

            let reply = Reply::parse(words)?;
            match reply.kind {
                ReplyKind::Data => rows.push(reply),
                ReplyKind::Empty => {}
                ReplyKind::Trap => {
                    // The device still finishes the command with !done
                    trap.get_or_insert(reply);
                }
                ReplyKind::Fatal => return Err(DirectoryError::Fatal(reply.message())),
                ReplyKind::Done => {
                    if let Some(trap) = trap {
                        return Err(DirectoryError::Rejected {
                            command: command.path().to_string(),
                            message: trap.message(),
                        });
                    }
                    return Ok((rows, reply));
                }
            }
        }
    }
}

fn account_from_reply(reply: &Reply) -> Result<Account, DirectoryError> {
    let id = reply
        .get(".id")
        .ok_or_else(|| DirectoryError::Protocol("hotspot user row without .id".to_string()))?;
    let name = reply
        .get("name")
        .ok_or_else(|| DirectoryError::Protocol(format!("hotspot user {} without name", id)))?;

    Ok(Account {
        id: id.to_string(),
        name: name.to_string(),
        profile: reply.get("profile").map(str::to_string),
        comment: reply
            .get("comment")
            .filter(|c| !c.is_empty())
            .map(str::to_string),
    })
}

#[async_trait]
impl AccountDirectory for RouterOsSession {
    async fn list_accounts(&mut self) -> Result<Vec<Account>, DirectoryError> {
        let command = Command::new(USER_PRINT).attr(".proplist", ".id,name,profile,comment");
        let (rows, _) = self.call(&command).await?;

        let mut accounts = Vec::with_capacity(rows.len());
        for row in &rows {
            let account = account_from_reply(row)?;
            if self.filter.admits(&account) {
                accounts.push(account);
            }
        }
        Ok(accounts)
    }

    async fn remove_account(&mut self, id: &str) -> Result<(), DirectoryError> {
        let command = Command::new(USER_REMOVE).attr(".id", id);
        self.call(&command).await?;
        Ok(())
    }

    async fn create_account(&mut self, account: &NewAccount) -> Result<(), DirectoryError> {
        let mut command = Command::new(USER_ADD)
            .attr("name", &account.name)
            .attr("password", &account.password)
            .attr("comment", &account.comment);
        if let Some(profile) = &account.profile {
            command = command.attr("profile", profile);
        }

        self.call(&command).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), DirectoryError> {
        if self.broken {
            return Ok(());
        }
        self.broken = true;

        // The device answers /quit with !fatal and drops the connection
        write_sentence(&mut self.stream, &["/quit"]).await?;
        match read_sentence(&mut self.stream).await {
            Ok(_) => Ok(()),
            Err(DirectoryError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(()),
            Err(e) => {
                warn!(address = %self.address, error = %e, "Unclean session close");
                Ok(())
            }
        }
    }
}
