use crate::common::models::*;
use serde::{Deserialize, Serialize};

/// Protocollo client-server: una riga JSON per richiesta, una per risposta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Registrazione di un nuovo utente
    Register {
        username: String,
        password: String,
        #[serde(default)]
        email: Option<String>,
    },

    /// Login di un utente esistente
    Login { username: String, password: String },

    Logout { session: Option<String> },

    /// Creazione di un gruppo; il creatore ne diventa admin
    CreateGroup {
        session: Option<String>,
        name: String,
        #[serde(default)]
        description: Option<String>,
    },

    /// Ingresso in un gruppo tramite codice invito
    JoinGroup {
        session: Option<String>,
        invite_code: String,
    },

    /// Uscita da un gruppo
    LeaveGroup {
        session: Option<String>,
        group_id: String,
    },

    MyGroups { session: Option<String> },

    GroupDetails {
        session: Option<String>,
        group_id: String,
    },

    CreateList {
        session: Option<String>,
        group_id: String,
        name: String,
        #[serde(default)]
        description: Option<String>,
    },

    GroupLists {
        session: Option<String>,
        group_id: String,
    },

    GetList {
        session: Option<String>,
        list_id: String,
    },

    UpdateList {
        session: Option<String>,
        list_id: String,
        #[serde(default)]
        changes: ListChanges,
    },

    DeleteList {
        session: Option<String>,
        list_id: String,
    },

    RecentLists {
        session: Option<String>,
        #[serde(default)]
        limit: Option<i64>,
    },

    AddItem {
        session: Option<String>,
        list_id: String,
        item: NewItem,
    },

    ListItems {
        session: Option<String>,
        list_id: String,
    },

    UpdateItem {
        session: Option<String>,
        item_id: String,
        #[serde(default)]
        changes: ItemChanges,
    },

    DeleteItem {
        session: Option<String>,
        item_id: String,
    },
}

impl ClientMessage {
    /// Nome del comando, per i log
    pub fn name(&self) -> &'static str {
        match self {
            ClientMessage::Register { .. } => "register",
            ClientMessage::Login { .. } => "login",
            ClientMessage::Logout { .. } => "logout",
            ClientMessage::CreateGroup { .. } => "create_group",
            ClientMessage::JoinGroup { .. } => "join_group",
            ClientMessage::LeaveGroup { .. } => "leave_group",
            ClientMessage::MyGroups { .. } => "my_groups",
            ClientMessage::GroupDetails { .. } => "group_details",
            ClientMessage::CreateList { .. } => "create_list",
            ClientMessage::GroupLists { .. } => "group_lists",
            ClientMessage::GetList { .. } => "get_list",
            ClientMessage::UpdateList { .. } => "update_list",
            ClientMessage::DeleteList { .. } => "delete_list",
            ClientMessage::RecentLists { .. } => "recent_lists",
            ClientMessage::AddItem { .. } => "add_item",
            ClientMessage::ListItems { .. } => "list_items",
            ClientMessage::UpdateItem { .. } => "update_item",
            ClientMessage::DeleteItem { .. } => "delete_item",
        }
    }
}

/// Categoria di errore, distinguibile dal client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    Internal,
}

/// Esito della leave, dal punto di vista di chi esce
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LeaveOutcome {
    /// Il gruppo è stato cancellato con tutte le sue liste
    GroupDeleted,
    /// La proprietà è passata a `new_owner`
    OwnershipTransferred { new_owner: String },
    Left,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Registered { session: Session },
    LoggedIn { session: Session },
    LoggedOut,
    GroupCreated { group: GroupDetails },
    GroupJoined { group: GroupDetails, message: String },
    GroupLeft { result: LeaveOutcome, message: String },
    GroupsList { groups: Vec<GroupDetails> },
    Group { group: GroupDetails },
    ListCreated { list: ListDetails },
    ListsList { lists: Vec<ListDetails> },
    List { list: ListDetails },
    ListDeleted { message: String },
    RecentLists { lists: Vec<ListDetails> },
    ItemCreated { item: ShoppingItem },
    ItemsList { items: Vec<ShoppingItem> },
    Item { item: ShoppingItem },
    ItemDeleted { message: String },
    Error {
        kind: ErrorKind,
        code: u16,
        message: String,
    },
}

impl ServerMessage {
    pub fn is_error(&self) -> bool {
        matches!(self, ServerMessage::Error { .. })
    }
}

/// Configurazione del protocollo
pub const MAX_GROUP_NAME_LENGTH: usize = 100;
pub const DEFAULT_RECENT_LISTS: i64 = 5;
