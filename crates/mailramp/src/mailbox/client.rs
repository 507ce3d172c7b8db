//! Low-level IMAP connection for mailbox inspection.

use async_imap::Session;
use async_native_tls::TlsConnector;
use futures_util::StreamExt;
use log::{debug, info, warn};
use secrecy::{ExposeSecret, SecretString};

use super::error::{MailboxError, Result};
use super::MailboxEndpoint;

/// Type alias for the underlying async stream (async-std compatible TcpStream).
type AsyncTcpStream = async_io::Async<std::net::TcpStream>;

/// Type alias for the TLS stream used by the IMAP session.
type TlsStream = async_native_tls::TlsStream<AsyncTcpStream>;

/// A logged-in IMAP session against a single mailbox.
pub struct ImapConnection {
    session: Option<Session<TlsStream>>,
}

impl ImapConnection {
    /// Connects to the endpoint and authenticates as `address`.
    pub async fn connect(
        endpoint: &MailboxEndpoint,
        address: &str,
        credential: &SecretString,
    ) -> Result<Self> {
        if !endpoint.use_tls {
            return Err(MailboxError::ConfigError(
                "TLS is required for mailbox connections".to_string(),
            ));
        }

        let addr = format!("{}:{}", endpoint.host, endpoint.port);
        debug!("Connecting to IMAP server at {} as {}", addr, address);

        // Establish TCP connection using std::net and wrap with async-io
        let std_stream = std::net::TcpStream::connect(&addr)
            .map_err(|e| MailboxError::ConnectionFailed(e.to_string()))?;
        std_stream
            .set_nonblocking(true)
            .map_err(|e| MailboxError::ConnectionFailed(e.to_string()))?;
        let tcp_stream = async_io::Async::new(std_stream)
            .map_err(|e| MailboxError::ConnectionFailed(e.to_string()))?;

        // Wrap with TLS
        let tls = TlsConnector::new();
        let tls_stream = tls
            .connect(&endpoint.host, tcp_stream)
            .await
            .map_err(|e| MailboxError::TlsError(e.to_string()))?;

        let client = async_imap::Client::new(tls_stream);

        let session = client
            .login(address, credential.expose_secret())
            .await
            .map_err(|(e, _)| MailboxError::AuthenticationFailed(e.to_string()))?;

        info!("IMAP login successful for {}", address);
        Ok(Self {
            session: Some(session),
        })
    }

    fn session(&mut self) -> Result<&mut Session<TlsStream>> {
        self.session
            .as_mut()
            .ok_or_else(|| MailboxError::ConnectionFailed("Not connected".to_string()))
    }

    /// Searches a folder read-only (EXAMINE, so nothing is marked as read)
    /// and returns the matching UIDs.
    pub async fn search_folder(&mut self, folder: &str, query: &str) -> Result<Vec<u32>> {
        let session = self.session()?;

        session.examine(folder).await.map_err(|e| {
            let text = e.to_string();
            if text.contains("Mailbox doesn't exist") || text.contains("NO") {
                MailboxError::FolderNotFound(folder.to_string())
            } else {
                MailboxError::ProtocolError(text)
            }
        })?;

        debug!("Searching folder '{}' with query: {}", folder, query);
        let uids = session
            .uid_search(query)
            .await
            .map_err(|e| MailboxError::ProtocolError(e.to_string()))?;

        Ok(uids.into_iter().collect())
    }

    /// Searches a folder opened writable (SELECT) and returns matching UIDs.
    /// Required before flag changes or moves.
    pub async fn search_folder_writable(&mut self, folder: &str, query: &str) -> Result<Vec<u32>> {
        let session = self.session()?;

        session.select(folder).await.map_err(|e| {
            let text = e.to_string();
            if text.contains("Mailbox doesn't exist") || text.contains("NO") {
                MailboxError::FolderNotFound(folder.to_string())
            } else {
                MailboxError::ProtocolError(text)
            }
        })?;

        let uids = session
            .uid_search(query)
            .await
            .map_err(|e| MailboxError::ProtocolError(e.to_string()))?;

        Ok(uids.into_iter().collect())
    }

    /// Adds the `\Seen` flag to a message in the currently selected folder.
    pub async fn mark_seen(&mut self, uid: u32) -> Result<()> {
        let session = self.session()?;

        let mut updates = session
            .uid_store(uid.to_string(), "+FLAGS (\\Seen)")
            .await
            .map_err(|e| MailboxError::ProtocolError(e.to_string()))?;
        // Drain the response stream; the server echoes updated flags.
        while let Some(update) = updates.next().await {
            update.map_err(|e| MailboxError::ProtocolError(e.to_string()))?;
        }
        Ok(())
    }

    /// Moves a message from the currently selected folder to `target`.
    pub async fn move_message(&mut self, uid: u32, target: &str) -> Result<()> {
        let session = self.session()?;

        session
            .uid_mv(uid.to_string(), target)
            .await
            .map_err(|e| MailboxError::ProtocolError(e.to_string()))
    }

    /// Disconnects gracefully.
    pub async fn logout(&mut self) -> Result<()> {
        if let Some(mut session) = self.session.take() {
            session
                .logout()
                .await
                .map_err(|e| MailboxError::ProtocolError(e.to_string()))?;
        }
        Ok(())
    }
}

impl Drop for ImapConnection {
    fn drop(&mut self) {
        if self.session.is_some() {
            warn!("ImapConnection dropped without explicit logout");
        }
    }
}
