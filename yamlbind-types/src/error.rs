/// Result type used throughout yamlbind.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Flat error enumeration returned by load, save and free.
///
/// Discriminants are stable numeric codes; 0 is reserved for success and is
/// therefore not a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
#[repr(u32)]
pub enum Error {
    #[error("Memory allocation failed")]
    Oom = 1,
    #[error("YAML alias unsupported")]
    Alias = 2,
    #[error("Could not open file")]
    FileOpen = 3,
    #[error("Invalid key")]
    InvalidKey = 4,
    #[error("Invalid value")]
    InvalidValue = 5,
    #[error("Internal error")]
    Internal = 6,
    #[error("Unexpected event")]
    UnexpectedEvent = 7,
    #[error("String length too short")]
    StringLengthMin = 8,
    #[error("String length too long")]
    StringLengthMax = 9,
    #[error("Data size must be 0 < X <= 8 bytes")]
    InvalidDataSize = 10,
    #[error("Top-level schema value must be pointer")]
    TopLevelNonPtr = 11,
    #[error("Schema contains invalid type")]
    BadTypeInSchema = 12,
    #[error("Bad schema: min exceeds max")]
    BadMinMaxSchema = 13,
    #[error("Bad parameter: seq_count")]
    BadParamSeqCount = 14,
    #[error("Bad parameter: NULL data")]
    BadParamNullData = 15,
    #[error("Bit value beyond bitfield size")]
    BadBitvalInSchema = 16,
    #[error("Sequence with too few entries")]
    SequenceEntriesMin = 17,
    #[error("Sequence with too many entries")]
    SequenceEntriesMax = 18,
    #[error("Fixed sequence with unequal min and max")]
    SequenceFixedCount = 19,
    #[error("Non-fixed sequence in sequence")]
    SequenceInSequence = 20,
    #[error("Missing required mapping field")]
    MappingFieldMissing = 21,
    #[error("Bad config: NULL mem function")]
    BadConfigNullMemFn = 22,
    #[error("Bad parameter: NULL config")]
    BadParamNullConfig = 23,
    #[error("Bad parameter: NULL schema")]
    BadParamNullSchema = 24,
    #[error("Failed to initialise YAML emitter")]
    EmitterInit = 25,
    #[error("Failed to initialise YAML parser")]
    ParserInit = 26,
    #[error("Failed to initialise YAML event")]
    EventInit = 27,
    #[error("Error inside YAML emitter")]
    Emitter = 28,
    #[error("Error inside YAML parser")]
    Parser = 29,
    #[error("No anchor found for alias")]
    InvalidAlias = 30,
}

impl Error {
    /// Every variant in code order.
    pub const ALL: [Error; 30] = [
        Error::Oom,
        Error::Alias,
        Error::FileOpen,
        Error::InvalidKey,
        Error::InvalidValue,
        Error::Internal,
        Error::UnexpectedEvent,
        Error::StringLengthMin,
        Error::StringLengthMax,
        Error::InvalidDataSize,
        Error::TopLevelNonPtr,
        Error::BadTypeInSchema,
        Error::BadMinMaxSchema,
        Error::BadParamSeqCount,
        Error::BadParamNullData,
        Error::BadBitvalInSchema,
        Error::SequenceEntriesMin,
        Error::SequenceEntriesMax,
        Error::SequenceFixedCount,
        Error::SequenceInSequence,
        Error::MappingFieldMissing,
        Error::BadConfigNullMemFn,
        Error::BadParamNullConfig,
        Error::BadParamNullSchema,
        Error::EmitterInit,
        Error::ParserInit,
        Error::EventInit,
        Error::Emitter,
        Error::Parser,
        Error::InvalidAlias,
    ];

    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Error> {
        Error::ALL.iter().copied().find(|e| e.code() == code)
    }
}

/// Human-readable text for a numeric result code.
pub fn strerror(code: u32) -> String {
    if code == 0 {
        return "Success".to_string();
    }
    match Error::from_code(code) {
        Some(err) => err.to_string(),
        None => "Invalid error code".to_string(),
    }
}
