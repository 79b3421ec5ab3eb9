use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, trace, warn};
use zbus::message::Type;
use zbus::zvariant::DynamicType;
use zbus::{connection, Connection, Message, MessageStream};

use bustap_config::BusConfig;
use bustap_core::bus::{
    BusCapabilities, BusConnection, Direction, Disposition, FilterChain, FilterId, MessageFilter,
};
use bustap_core::shutdown::FatalReporter;
use bustap_core::CaptureError;

use crate::message::ZbusMessage;
use crate::rules::{self, DBUS_INTERFACE, DBUS_NAME, DBUS_PATH};

fn bus_error(e: zbus::Error) -> CaptureError {
    CaptureError::Bus(e.to_string())
}

/// A D-Bus connection whose traffic runs through a [`FilterChain`].
///
/// A dispatch task reads every inbound message and runs the chain on it.
/// Calls made through [`ZbusConnection::call_bus`] run the chain as
/// outbound traffic before they are sent.
pub struct ZbusConnection {
    connection: Option<Connection>,
    unique_name: Option<String>,
    capabilities: BusCapabilities,
    filters: Arc<FilterChain>,
    dispatch: Option<JoinHandle<()>>,
}

impl ZbusConnection {
    /// Connects and starts dispatching. Dispatch failures are reported
    /// through `fatal`.
    #[instrument(skip_all, fields(address = %config.address))]
    pub async fn connect(config: &BusConfig, fatal: FatalReporter) -> Result<Self, CaptureError> {
        let connection = match config.address.as_str() {
            "session" => Connection::session().await,
            "system" => Connection::system().await,
            address => match connection::Builder::address(address) {
                Ok(builder) => builder.build().await,
                Err(e) => Err(e),
            },
        }
        .map_err(|e| CaptureError::setup("Couldn't connect to bus", e))?;

        let unique_name = connection.unique_name().map(|name| name.to_string());
        info!(
            "Connected to {} bus as {}",
            config.address,
            unique_name.as_deref().unwrap_or("(anonymous)")
        );

        let filters = Arc::new(FilterChain::new());
        // The stream only sees messages received after it exists, so it is
        // created before any match rule is added.
        let stream = MessageStream::from(&connection);
        let dispatch = tokio::spawn(dispatch_loop(stream, filters.clone(), fatal));

        Ok(Self {
            connection: Some(connection),
            unique_name,
            capabilities: BusCapabilities {
                unix_fd_passing: config.unix_fd_passing,
            },
            filters,
            dispatch: Some(dispatch),
        })
    }

    fn connection(&self) -> Result<&Connection, CaptureError> {
        self.connection
            .as_ref()
            .ok_or_else(|| CaptureError::Bus("connection is closed".into()))
    }

    /// Calls a method on the broker and waits for its reply.
    ///
    /// The call is filtered as outbound traffic first; a suppressed call is
    /// not sent and yields `Ok(None)`.
    pub async fn call_bus<B>(&self, method: &str, body: &B) -> Result<Option<Message>, CaptureError>
    where
        B: serde::Serialize + DynamicType,
    {
        let connection = self.connection()?;
        let call = Message::method(DBUS_PATH, method)
            .and_then(|builder| builder.destination(DBUS_NAME))
            .and_then(|builder| builder.interface(DBUS_INTERFACE))
            .and_then(|builder| builder.build(body))
            .map_err(|e| CaptureError::Serialization(e.to_string()))?;

        if self.filters.run(&ZbusMessage(call.clone()), Direction::Outbound)?
            == Disposition::Suppress
        {
            return Ok(None);
        }

        let serial = call.primary_header().serial_num();
        let mut replies = MessageStream::from(connection);
        connection.send(&call).await.map_err(bus_error)?;

        while let Some(reply) = replies.next().await {
            let reply = reply.map_err(bus_error)?;
            if reply.header().reply_serial() != Some(serial) {
                continue;
            }
            return match reply.message_type() {
                Type::Error => {
                    let name = reply
                        .header()
                        .error_name()
                        .map(|name| name.to_string())
                        .unwrap_or_default();
                    Err(CaptureError::Bus(format!("{method} failed: {name}")))
                }
                _ => Ok(Some(reply)),
            };
        }
        Err(CaptureError::Bus(format!(
            "connection closed while waiting for {method} reply"
        )))
    }

    /// Adds one match rule per message type.
    pub async fn match_everything(&self, eavesdrop: bool) -> Result<(), CaptureError> {
        for rule in rules::match_everything(eavesdrop) {
            self.call_bus("AddMatch", &(rule.as_str(),))
                .await
                .map_err(|e| CaptureError::setup(&format!("Couldn't AddMatch({rule})"), e))?;
            debug!("Added match rule {rule}");
        }
        Ok(())
    }

    /// Looks up the owner of every well-known name so the replies end up in
    /// the capture. Names that vanish before the lookup are skipped.
    pub async fn enumerate_peers(&self) -> Result<usize, CaptureError> {
        let Some(reply) = self
            .call_bus("ListNames", &())
            .await
            .map_err(|e| CaptureError::setup("Couldn't ListNames", e))?
        else {
            return Ok(0);
        };
        let names: Vec<String> = reply
            .body()
            .deserialize()
            .map_err(|e| CaptureError::setup("Couldn't ListNames", e))?;

        let mut resolved = 0;
        for name in rules::names_to_resolve(&names) {
            match self.call_bus("GetNameOwner", &(name,)).await {
                Ok(_) => resolved += 1,
                // They were too quick for us.
                Err(e) => debug!("GetNameOwner({name}) failed: {e}"),
            }
        }
        info!("Resolved owners of {resolved} well-known names");
        Ok(resolved)
    }
}

async fn dispatch_loop(mut stream: MessageStream, filters: Arc<FilterChain>, fatal: FatalReporter) {
    while let Some(next) = stream.next().await {
        let message = match next {
            Ok(message) => ZbusMessage(message),
            Err(e) => {
                fatal.report(CaptureError::Bus(e.to_string()));
                return;
            }
        };
        match filters.run(&message, Direction::Inbound) {
            Ok(Disposition::Deliver) => trace!("Delivered inbound message"),
            Ok(Disposition::Suppress) => trace!("Suppressed eavesdropped message"),
            Err(err) => {
                fatal.report(err);
                return;
            }
        }
    }
    debug!("Bus message stream ended");
}

#[async_trait]
impl BusConnection for ZbusConnection {
    fn unique_name(&self) -> Option<String> {
        self.unique_name.clone()
    }

    fn capabilities(&self) -> BusCapabilities {
        self.capabilities
    }

    fn add_filter(&mut self, filter: Arc<dyn MessageFilter>) -> FilterId {
        self.filters.add(filter)
    }

    fn remove_filter(&mut self, id: FilterId) -> bool {
        self.filters.remove(id)
    }

    async fn close(&mut self) -> Result<(), CaptureError> {
        if let Some(dispatch) = self.dispatch.take() {
            dispatch.abort();
            if let Err(e) = dispatch.await {
                if !e.is_cancelled() {
                    warn!("Dispatch task failed: {e}");
                }
            }
        }
        // Dropping the last handle closes the socket.
        if self.connection.take().is_some() {
            info!("Bus connection closed");
        }
        Ok(())
    }
}
