use spesa::client::group_client::GroupClient;
use spesa::common::protocol::{ClientMessage, ServerMessage};
use spesa::server::config::ClientConfig;

fn session_of(resp: &ServerMessage) -> anyhow::Result<String> {
    match resp {
        ServerMessage::Registered { session } | ServerMessage::LoggedIn { session } => Ok(session.token.clone()),
        other => Err(anyhow::anyhow!("No session in response: {:?}", other)),
    }
}

/// Scenario completo contro un server in esecuzione: A crea, B entra, A esce.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = ClientConfig::from_env();
    let host = cfg.server_addr();
    println!("Using host {}", host);

    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let mut alice = GroupClient::connect(&host).await?;
    let mut bob = GroupClient::connect(&host).await?;

    let resp = alice
        .send(&ClientMessage::Register {
            username: format!("alice-{}", &suffix[..8]),
            password: "smoke-test".into(),
            email: None,
        })
        .await?;
    let alice_session = session_of(&resp)?;
    let resp = bob
        .send(&ClientMessage::Register {
            username: format!("bob-{}", &suffix[..8]),
            password: "smoke-test".into(),
            email: None,
        })
        .await?;
    let bob_session = session_of(&resp)?;

    let resp = alice
        .send(&ClientMessage::CreateGroup {
            session: Some(alice_session.clone()),
            name: "Casa".into(),
            description: Some("spesa settimanale".into()),
        })
        .await?;
    let ServerMessage::GroupCreated { group } = resp else {
        return Err(anyhow::anyhow!("CREATE -> {:?}", resp));
    };
    println!("CREATE -> group {} invite {}", group.group.id, group.group.invite_code);

    let resp = bob
        .send(&ClientMessage::JoinGroup {
            session: Some(bob_session.clone()),
            invite_code: group.group.invite_code.clone(),
        })
        .await?;
    println!("JOIN -> {:?}", resp);

    let resp = alice
        .send(&ClientMessage::LeaveGroup {
            session: Some(alice_session),
            group_id: group.group.id.clone(),
        })
        .await?;
    println!("LEAVE -> {:?}", resp);

    let resp = bob
        .send(&ClientMessage::GroupDetails {
            session: Some(bob_session),
            group_id: group.group.id,
        })
        .await?;
    println!("DETAILS -> {:?}", resp);

    Ok(())
}
