use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Speaker of a conversation turn.
///
/// Roles other than `user` and `assistant` are carried through untouched so
/// the completion service decides whether they are valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    Other(String),
}

impl Role {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Other(role) => role.as_str(),
        }
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        match value.as_str() {
            "user" => Role::User,
            "assistant" => Role::Assistant,
            _ => Role::Other(value),
        }
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Role::from)
    }
}

/// One message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// The ordered turns sent upstream for one call. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationRequest {
    turns: Vec<Turn>,
}

impl ConversationRequest {
    /// Merge caller history with the new question.
    ///
    /// History is copied verbatim. The question is appended as a `user` turn
    /// unless the history already ends with a `user` turn, in which case the
    /// caller is assumed to have appended it already.
    #[must_use]
    pub fn build(question: &str, history: Vec<Turn>) -> Self {
        Self {
            turns: build_turns(question, history),
        }
    }

    #[must_use]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// See [`ConversationRequest::build`].
#[must_use]
pub fn build_turns(question: &str, mut history: Vec<Turn>) -> Vec<Turn> {
    let ends_with_user = history
        .last()
        .is_some_and(|turn| turn.role == Role::User);
    if !ends_with_user {
        history.push(Turn::user(question));
    }
    history
}
