use serde_json::{Value, json};

pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProtocolError {
    pub code: i64,
    pub message: String,
}

impl ProtocolError {
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: INVALID_PARAMS,
            message: message.into(),
        }
    }

    fn method_not_found() -> Self {
        Self {
            code: METHOD_NOT_FOUND,
            message: "Method not found".to_string(),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BridgeRequest {
    Ping { message: String },
    Authenticate,
    ReadFile { path: String },
    EditFile { path: String, full_content: String },
    GetDiagnostics { path: String },
    OpenUri { uri: String },
}

impl BridgeRequest {
    pub fn method(&self) -> &'static str {
        match self {
            Self::Ping { .. } => "ping",
            Self::Authenticate => "authenticate",
            Self::ReadFile { .. } => "readFile",
            Self::EditFile { .. } => "editFile",
            Self::GetDiagnostics { .. } => "getDiagnostics",
            Self::OpenUri { .. } => "openURI",
        }
    }
}

/// A client request with its id. Frames that are not requests, or carry no
/// id, never produce one.
#[derive(Clone, Debug, PartialEq)]
pub struct IncomingRequest {
    pub id: Value,
    pub request: Result<BridgeRequest, ProtocolError>,
}

pub fn parse_client_message(text: &str) -> Option<IncomingRequest> {
    let message: Value = serde_json::from_str(text).ok()?;
    let request = message.get("clientRequest")?.as_object()?;
    let id = request.get("id").filter(|id| has_id(id))?.clone();

    let param = |method: &str, key: &str| -> Option<String> {
        request
            .get(method)?
            .get(key)?
            .as_str()
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };

    let parsed = if request.contains_key("ping") {
        Ok(BridgeRequest::Ping {
            message: param("ping", "message").unwrap_or_default(),
        })
    } else if request.contains_key("authenticate") {
        Ok(BridgeRequest::Authenticate)
    } else if request.contains_key("readFile") {
        param("readFile", "path")
            .map(|path| BridgeRequest::ReadFile { path })
            .ok_or_else(|| ProtocolError::invalid_params("readFile requires path parameter"))
    } else if request.contains_key("editFile") {
        let content = request
            .get("editFile")
            .and_then(|params| params.get("fullContent"))
            .and_then(Value::as_str);
        match (param("editFile", "path"), content) {
            (Some(path), Some(content)) => Ok(BridgeRequest::EditFile {
                path,
                full_content: content.to_string(),
            }),
            _ => Err(ProtocolError::invalid_params(
                "editFile requires path and fullContent",
            )),
        }
    } else if request.contains_key("getDiagnostics") {
        param("getDiagnostics", "path")
            .map(|path| BridgeRequest::GetDiagnostics { path })
            .ok_or_else(|| ProtocolError::invalid_params("getDiagnostics requires path parameter"))
    } else if request.contains_key("openURI") {
        param("openURI", "uri")
            .map(|uri| BridgeRequest::OpenUri { uri })
            .ok_or_else(|| ProtocolError::invalid_params("openURI requires uri parameter"))
    } else {
        Err(ProtocolError::method_not_found())
    };

    Some(IncomingRequest {
        id,
        request: parsed,
    })
}

fn has_id(id: &Value) -> bool {
    match id {
        Value::Null => false,
        Value::String(text) => !text.is_empty(),
        _ => true,
    }
}

pub fn response(id: &Value, method: &str, payload: Value) -> String {
    let mut body = serde_json::Map::new();
    body.insert("id".to_string(), id.clone());
    body.insert(method.to_string(), payload);
    json!({ "serverResponse": body }).to_string()
}

pub fn error_response(id: &Value, error: &ProtocolError) -> String {
    json!({
        "serverResponse": {
            "id": id,
            "error": { "code": error.code, "message": error.message },
        }
    })
    .to_string()
}

pub fn notification(name: &str, payload: Value) -> String {
    let mut body = serde_json::Map::new();
    body.insert(name.to_string(), payload);
    json!({ "serverNotification": body }).to_string()
}
