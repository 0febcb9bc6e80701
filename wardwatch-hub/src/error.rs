/// Erreurs de décodage d'un datagramme ou d'une trame d'alerte.
/// Toujours récupérées localement : l'unité fautive est jetée, la boucle continue.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid JSON record: {0}")]
    Json(#[from] serde_json::Error),
    #[error("empty patient_id")]
    EmptyPatientId,
    #[error("timestamp is not a finite number")]
    InvalidTimestamp,
}

/// Erreurs au niveau process (démarrage, configuration)
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("cannot bind {channel} listener on {addr}: {source}")]
    Bind {
        channel: &'static str,
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_yaml::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
