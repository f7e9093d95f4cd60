use crate::ingest::Ingestor;

#[derive(Clone)]
pub struct AppState {
    pub ingest: Ingestor,
}

impl AppState {
    pub fn new(ingest: Ingestor) -> Self {
        Self { ingest }
    }
}
