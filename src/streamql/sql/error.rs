use std::fmt;

/// Errors that can occur during query compilation and stream execution
#[derive(Debug, Clone, PartialEq)]
pub enum SqlError {
    /// Query parsing errors
    ParseError {
        message: String,
        position: Option<usize>,
    },

    /// Stream configuration errors (plan building)
    ConfigError {
        message: String,
        parameter: Option<String>,
    },

    /// Expression compilation or evaluation errors
    EvalError {
        message: String,
        expression: Option<String>,
    },

    /// Window construction and dispatch errors
    WindowError {
        message: String,
        window_type: Option<String>,
    },

    /// Pipeline errors (closed channels, cancelled stages)
    PipelineError { stage: String, message: String },

    /// Type conversion errors
    TypeError {
        expected: String,
        actual: String,
        value: Option<String>,
    },
}

impl fmt::Display for SqlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlError::ParseError { message, position } => {
                if let Some(pos) = position {
                    write!(f, "SQL parse error at position {}: {}", pos, message)
                } else {
                    write!(f, "SQL parse error: {}", message)
                }
            }
            SqlError::ConfigError { message, parameter } => {
                if let Some(param) = parameter {
                    write!(f, "Stream config error for '{}': {}", param, message)
                } else {
                    write!(f, "Stream config error: {}", message)
                }
            }
            SqlError::EvalError {
                message,
                expression,
            } => {
                if let Some(expr) = expression {
                    write!(f, "Expression error in '{}': {}", expr, message)
                } else {
                    write!(f, "Expression error: {}", message)
                }
            }
            SqlError::WindowError {
                message,
                window_type,
            } => {
                if let Some(wtype) = window_type {
                    write!(f, "Window error for {} window: {}", wtype, message)
                } else {
                    write!(f, "Window error: {}", message)
                }
            }
            SqlError::PipelineError { stage, message } => {
                write!(f, "Pipeline error in {} stage: {}", stage, message)
            }
            SqlError::TypeError {
                expected,
                actual,
                value,
            } => {
                if let Some(val) = value {
                    write!(
                        f,
                        "Type error: expected {}, got {} for value '{}'",
                        expected, actual, val
                    )
                } else {
                    write!(f, "Type error: expected {}, got {}", expected, actual)
                }
            }
        }
    }
}

impl std::error::Error for SqlError {}

impl SqlError {
    /// Create a parse error with position
    pub fn parse_error(message: impl Into<String>, position: Option<usize>) -> Self {
        SqlError::ParseError {
            message: message.into(),
            position,
        }
    }

    /// Create a stream config error
    pub fn config_error(message: impl Into<String>, parameter: Option<String>) -> Self {
        SqlError::ConfigError {
            message: message.into(),
            parameter,
        }
    }

    /// Create an expression error
    pub fn eval_error(message: impl Into<String>, expression: Option<String>) -> Self {
        SqlError::EvalError {
            message: message.into(),
            expression,
        }
    }

    /// Create a window error
    pub fn window_error(message: impl Into<String>, window_type: Option<String>) -> Self {
        SqlError::WindowError {
            message: message.into(),
            window_type,
        }
    }

    /// Create a pipeline error
    pub fn pipeline_error(stage: impl Into<String>, message: impl Into<String>) -> Self {
        SqlError::PipelineError {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Create a type error
    pub fn type_error(
        expected: impl Into<String>,
        actual: impl Into<String>,
        value: Option<String>,
    ) -> Self {
        SqlError::TypeError {
            expected: expected.into(),
            actual: actual.into(),
            value,
        }
    }
}

/// Result type for SQL operations
pub type SqlResult<T> = Result<T, SqlError>;
