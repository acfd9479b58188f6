use thiserror::Error;

/// Workbook import failures that stop the import as a whole.
/// Row-level problems are reported as `ImportIssue`s instead.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Hoja faltante: {0}")]
    MissingSheet(String),
    #[error("Columnas faltantes en {sheet}: {}", .columns.join(", "))]
    MissingColumns { sheet: String, columns: Vec<String> },
    #[error("Libro de Excel inválido: {0}")]
    Workbook(String),
    #[error("Error escribiendo el libro: {0}")]
    Export(#[from] rust_xlsxwriter::XlsxError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("No hay proveedor de IA disponible para {0}")]
    NoProviderAvailable(String),
    #[error("Proveedor no configurado: {0}")]
    ProviderNotConfigured(String),
    #[error("Falta la API key de {0}")]
    MissingApiKey(String),
    #[error("Error HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{provider} respondió {status}: {body}")]
    Api {
        provider: String,
        status: u16,
        body: String,
    },
    #[error("Respuesta inválida de {provider}: {message}")]
    InvalidResponse { provider: String, message: String },
    #[error("Error de almacenamiento: {0}")]
    Store(String),
}
