use atlas_db::DbError;
use miette::Diagnostic;
use thiserror::Error;

/// Errors raised by a data source while resolving a single block.
///
/// These never reach callers on their own: the registry wraps them in
/// [`CoreError::DataSource`] together with the block path.
#[derive(Error, Diagnostic, Debug)]
pub enum ProviderError {
    #[error("invalid attributes: {0}")]
    #[diagnostic(
        code(atlas_core::provider::attributes),
        help("check the block's attribute names and types")
    )]
    Attributes(#[source] serde_json::Error),

    #[error("unknown decoder: {0:?}")]
    #[diagnostic(
        code(atlas_core::provider::unknown_decoder),
        help("supported decoders: string")
    )]
    UnknownDecoder(String),

    #[error("unsupported decoder: {0:?}")]
    #[diagnostic(
        code(atlas_core::provider::unsupported_decoder),
        help("only the string decoder is currently supported")
    )]
    UnsupportedDecoder(String),

    #[error("opening variable {url:?}: {reason}")]
    #[diagnostic(
        code(atlas_core::provider::open_variable),
        help("supported schemes: constant, env, file")
    )]
    OpenVariable { url: String, reason: String },

    #[error("reading variable: {0}")]
    #[diagnostic(code(atlas_core::provider::read_variable))]
    ReadVariable(String),

    #[error("decoding variable: {0}")]
    #[diagnostic(code(atlas_core::provider::decode_variable))]
    DecodeVariable(String),

    #[error("query returned {0} columns, expected exactly one")]
    #[diagnostic(
        code(atlas_core::provider::column_count),
        help("select a single column to use value or values")
    )]
    ColumnCount(usize),

    #[error("{file}: undefined variable {variable:?}")]
    #[diagnostic(
        code(atlas_core::provider::undefined_variable),
        help("pass the variable through the block's vars attribute")
    )]
    UndefinedVariable { file: String, variable: String },

    #[error("{file}: {message}")]
    #[diagnostic(code(atlas_core::provider::template))]
    Template { file: String, message: String },

    #[error("missing atlas cloud config")]
    #[diagnostic(
        code(atlas_core::provider::missing_cloud_config),
        help("declare an atlas.cloud block with both url and token")
    )]
    MissingCloudConfig,

    #[error("sending request: {0}")]
    #[diagnostic(code(atlas_core::provider::http))]
    Http(#[from] reqwest::Error),

    #[error("unexpected response status {status}: {body}")]
    #[diagnostic(code(atlas_core::provider::status))]
    Status { status: u16, body: String },

    #[error("malformed response body: {0}")]
    #[diagnostic(code(atlas_core::provider::malformed_response))]
    MalformedResponse(String),

    #[error("decoding directory content: {0}")]
    #[diagnostic(code(atlas_core::provider::base64))]
    Base64(#[from] base64::DecodeError),

    #[error("extracting directory archive: {0}")]
    #[diagnostic(code(atlas_core::provider::archive))]
    Archive(#[source] DbError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Db(#[from] DbError),

    #[error("IO error: {0}")]
    #[diagnostic(code(atlas_core::provider::io))]
    Io(#[from] std::io::Error),
}

#[derive(Error, Diagnostic, Debug)]
pub enum CoreError {
    #[error("parsing document: {0}")]
    #[diagnostic(code(atlas_core::parse))]
    Parse(#[from] toml::de::Error),

    #[error("invalid document: {0}")]
    #[diagnostic(code(atlas_core::document))]
    Document(String),

    #[error("invalid expression {expr:?}: {message}")]
    #[diagnostic(code(atlas_core::expression))]
    Expression { expr: String, message: String },

    #[error("unknown reference {0}")]
    #[diagnostic(
        code(atlas_core::unknown_reference),
        help("references look like var.name, data.<type>.<label>.<attr> or atlas.cloud")
    )]
    UnknownReference(String),

    #[error("unsupported attribute {attribute:?} of {block}")]
    #[diagnostic(code(atlas_core::unavailable_attribute))]
    UnavailableAttribute { block: String, attribute: String },

    #[error("missing value for variable {0:?}")]
    #[diagnostic(
        code(atlas_core::missing_variable),
        help("pass it with --var name=value or declare a default")
    )]
    MissingVariable(String),

    #[error("variable {name:?}: expected {expected}, got {got}")]
    #[diagnostic(code(atlas_core::variable_type))]
    VariableType {
        name: String,
        expected: String,
        got: String,
    },

    #[error("dependency cycle through {0}")]
    #[diagnostic(code(atlas_core::cycle))]
    Cycle(String),

    #[error("unknown data source type {type_name:?}")]
    #[diagnostic(
        code(atlas_core::unknown_data_source),
        help("available data sources: {}", available.join(", "))
    )]
    UnknownDataSource {
        type_name: String,
        available: Vec<String>,
    },

    #[error("{path}: {source}")]
    #[diagnostic(code(atlas_core::data_source))]
    DataSource {
        path: String,
        #[source]
        source: ProviderError,
    },

    #[error("decoding output: {0}")]
    #[diagnostic(code(atlas_core::output))]
    Output(#[source] serde_json::Error),

    #[error("no schema url given")]
    #[diagnostic(code(atlas_core::no_schema_url))]
    NoSchemaUrl,

    #[error("no state loader registered for scheme {0:?}")]
    #[diagnostic(code(atlas_core::no_loader))]
    NoLoader(String),

    #[error("diff is not supported for {0}")]
    #[diagnostic(
        code(atlas_core::no_differ),
        help("ent schemas can only be diffed with the globalid feature enabled: add ?globalid=1")
    )]
    NoDiffer(String),

    #[error("loading schema {path}: {message}")]
    #[diagnostic(code(atlas_core::schema_source))]
    SchemaSource { path: String, message: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Db(#[from] DbError),

    #[error("IO error: {0}")]
    #[diagnostic(code(atlas_core::io))]
    Io(#[from] std::io::Error),
}

impl CoreError {
    pub fn expression(expr: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Expression {
            expr: expr.into(),
            message: message.into(),
        }
    }

    pub fn document(message: impl Into<String>) -> Self {
        Self::Document(message.into())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
