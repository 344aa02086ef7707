//! Multi-backend data gateway
//!
//! Routes data operations to the client of the location that owns the data.
//! Client failures are logged here with the backend name and surface to the
//! caller only as internal errors.

use cairn_common::config::DataConfig;
use cairn_common::{DataRetrievalInfo, Error, Result};
use futures::future::join_all;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, error};

use crate::client::{BackendHealth, ByteRange, DataClient, DataStream, KeyContext};
use crate::error::BackendError;
use crate::location::BackendInfo;

/// Location name to backend client
pub struct DataGateway {
    clients: HashMap<String, DataClient>,
}

impl DataGateway {
    pub const fn new(clients: HashMap<String, DataClient>) -> Self {
        Self { clients }
    }

    /// Build one client per configured location
    pub fn from_config(config: &DataConfig) -> std::result::Result<Self, BackendError> {
        let clients = config
            .locations
            .iter()
            .map(|(name, location)| Ok((name.clone(), DataClient::from_config(location)?)))
            .collect::<std::result::Result<HashMap<_, _>, BackendError>>()?;
        Ok(Self::new(clients))
    }

    /// Configured location names
    pub fn locations(&self) -> impl Iterator<Item = &str> {
        self.clients.keys().map(String::as_str)
    }

    pub fn client(&self, location: &str) -> Option<&DataClient> {
        self.clients.get(location)
    }

    /// Store a stream in the controlling location
    pub async fn put(
        &self,
        stream: DataStream,
        size: u64,
        key_context: &KeyContext,
        backend_info: &BackendInfo,
        request_id: &str,
    ) -> Result<DataRetrievalInfo> {
        let controlling = backend_info.controlling_location_constraint();
        let Some(client) = self.clients.get(controlling) else {
            error!(
                location = %controlling,
                request_id = %request_id,
                "No data backend matching controlling location constraint"
            );
            return Err(Error::internal("no data backend for location"));
        };

        match client.put(stream, size, key_context, request_id).await {
            Ok(key) => {
                debug!(location = %controlling, key = %key, "Stored object data");
                Ok(DataRetrievalInfo::new(key, controlling))
            }
            Err(e) => Err(datastore_failure(controlling, client, request_id, &e)),
        }
    }

    /// Read data, optionally a byte range of it
    pub async fn get(
        &self,
        object_get_info: &DataRetrievalInfo,
        range: Option<ByteRange>,
        request_id: &str,
    ) -> Result<DataStream> {
        let client = self.client_for(object_get_info, request_id)?;
        client
            .get(client.address(object_get_info), range, request_id)
            .await
            .map_err(|e| {
                datastore_failure(&object_get_info.data_store_name, client, request_id, &e)
            })
    }

    pub async fn delete(&self, object_get_info: &DataRetrievalInfo, request_id: &str) -> Result<()> {
        let client = self.client_for(object_get_info, request_id)?;
        client
            .delete(client.address(object_get_info), request_id)
            .await
            .map_err(|e| {
                datastore_failure(&object_get_info.data_store_name, client, request_id, &e)
            })
    }

    /// Probe every backend that supports it, concurrently
    pub async fn healthcheck(&self, request_id: &str) -> BTreeMap<String, BackendHealth> {
        let probes = self.clients.iter().map(|(location, client)| async move {
            client
                .healthcheck(request_id)
                .await
                .map(|health| (location.clone(), health))
        });
        join_all(probes).await.into_iter().flatten().collect()
    }

    fn client_for(&self, info: &DataRetrievalInfo, request_id: &str) -> Result<&DataClient> {
        self.clients.get(&info.data_store_name).ok_or_else(|| {
            error!(
                location = %info.data_store_name,
                request_id = %request_id,
                "Data location is not configured"
            );
            Error::internal("no data backend for location")
        })
    }
}

fn datastore_failure(
    location: &str,
    client: &DataClient,
    request_id: &str,
    e: &BackendError,
) -> Error {
    error!(
        location = %location,
        client_type = client.client_type(),
        request_id = %request_id,
        error = %e,
        "Error from datastore"
    );
    Error::internal("data backend failure")
}
