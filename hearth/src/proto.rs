pub mod room {
    use serde_json::Value;

    include!("./generated/room.rs");

    impl User {
        pub fn new(id: impl Into<String>, info: &Value) -> Self {
            Self {
                id: id.into(),
                info: Some(info.to_string()),
            }
        }

        /// A user record carrying only its id, as used by `del-user`.
        pub fn id_only(id: impl Into<String>) -> Self {
            Self {
                id: id.into(),
                info: None,
            }
        }

        /// The parsed `info` document, `null` when absent.
        pub fn info_value(&self) -> Result<Value, serde_json::Error> {
            parse_json(self.info.as_deref())
        }
    }

    impl Event {
        pub fn new(id: impl Into<String>, data: &Value) -> Self {
            Self {
                id: id.into(),
                data: Some(data.to_string()),
            }
        }

        pub fn id_only(id: impl Into<String>) -> Self {
            Self {
                id: id.into(),
                data: None,
            }
        }

        pub fn data_value(&self) -> Result<Value, serde_json::Error> {
            parse_json(self.data.as_deref())
        }
    }

    fn parse_json(text: Option<&str>) -> Result<Value, serde_json::Error> {
        match text {
            Some(text) => serde_json::from_str(text),
            None => Ok(Value::Null),
        }
    }
}

pub mod pairing {
    include!("./generated/pairing.rs");
}
