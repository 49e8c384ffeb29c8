pub mod codec;
pub mod errors;
pub mod logger;
pub mod query;
pub mod test_support;
pub mod transport;
pub mod value;

pub use codec::{Decoder, RemoteObject, ValueDecoder};
pub use errors::QueryError;
pub use query::{Constraint, ExecOptions, LogicOp, Order, Query};
pub use transport::{Transport, Verb};
pub use value::{ConstraintValue, Distance, GeoPoint, Pointer};

/// Façade over the query executor: owns the transport and decoder
/// capabilities and runs queries against the remote store.
pub struct Client<T: Transport, D: Decoder> {
    transport: T,
    decoder: D,
    options: ExecOptions,
}

impl<T: Transport, D: Decoder> Client<T, D> {
    pub fn new(transport: T, decoder: D) -> Self {
        Self { transport, decoder, options: ExecOptions::default() }
    }

    pub fn with_options(transport: T, decoder: D, options: ExecOptions) -> Self {
        Self { transport, decoder, options }
    }

    #[must_use]
    pub fn options(&self) -> &ExecOptions {
        &self.options
    }

    /// Starts a query against the named collection.
    #[must_use]
    pub fn query(&self, class_name: &str) -> Query {
        Query::new(class_name)
    }

    /// Runs the query and returns every decoded match, in backend order.
    pub fn find(&self, query: &Query) -> Result<Vec<D::Object>, QueryError> {
        query::find(&self.transport, &self.decoder, query, &self.options)
    }

    /// Fetches one object by identifier; `NotFound` when it does not exist.
    pub fn get(&self, query: &Query, object_id: &str) -> Result<D::Object, QueryError> {
        query::get(&self.transport, &self.decoder, query, object_id, &self.options)
    }

    /// Returns the first match without touching the query's own limit.
    pub fn get_first(&self, query: &Query) -> Result<D::Object, QueryError> {
        query::get_first(&self.transport, &self.decoder, query, &self.options)
    }

    /// Counts matches without transferring row bodies.
    pub fn count(&self, query: &Query) -> Result<u64, QueryError> {
        query::count(&self.transport, query, &self.options)
    }
}

/// Initializes the logging system. Call once before other operations if
/// file logging is wanted; everything works without it.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    logger::init()?;
    Ok(())
}
