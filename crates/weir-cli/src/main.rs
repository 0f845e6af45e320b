//! Weir CLI - produce, consume, and administer topics and groups.

use bytes::Bytes;
use clap::{Parser, Subcommand};
use weir_client::{BrokerClient, ControllerClient, CoordinatorClient};
use weir_protocol::{AckMode, ErrorCode, RecordData};

#[derive(Parser)]
#[command(name = "weir")]
#[command(about = "Weir - a distributed, partitioned commit log")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Produce a record to a topic partition
    Produce {
        /// Topic name
        topic: String,

        /// Record value
        value: String,

        /// Record key (optional)
        #[arg(short, long)]
        key: Option<String>,

        /// Partition
        #[arg(short, long, default_value = "0")]
        partition: i32,

        /// Producer id for idempotent produce (optional)
        #[arg(long)]
        producer_id: Option<String>,

        /// Sequence number, used with --producer-id
        #[arg(long, default_value = "0")]
        sequence: i64,

        /// Broker address
        #[arg(short, long, default_value = "127.0.0.1:9092")]
        broker: String,
    },

    /// Consume records from a topic partition
    Consume {
        /// Topic name
        topic: String,

        /// Partition
        #[arg(short, long, default_value = "0")]
        partition: i32,

        /// Starting offset
        #[arg(short, long, default_value = "0")]
        offset: i64,

        /// Maximum bytes per fetch
        #[arg(long, default_value = "1048576")]
        max_bytes: i64,

        /// Follow mode - keep polling for new records
        #[arg(short, long)]
        follow: bool,

        /// Consumer group to join (optional; commits progress)
        #[arg(short, long)]
        group: Option<String>,

        /// Coordinator address, used with --group
        #[arg(long, default_value = "127.0.0.1:9094")]
        coordinator: String,

        /// Broker address
        #[arg(short, long, default_value = "127.0.0.1:9092")]
        broker: String,
    },

    /// Topic management against the controller
    Topic {
        #[command(subcommand)]
        action: TopicCommands,
    },

    /// Consumer group management against the coordinator
    Group {
        #[command(subcommand)]
        action: GroupCommands,
    },
}

#[derive(Subcommand)]
enum TopicCommands {
    /// Create a topic
    Create {
        name: String,

        #[arg(short, long, default_value = "3")]
        partitions: i32,

        #[arg(short, long, default_value = "1")]
        replication_factor: i32,

        #[arg(short, long, default_value = "127.0.0.1:9093")]
        controller: String,
    },

    /// List topics
    List {
        #[arg(short, long, default_value = "127.0.0.1:9093")]
        controller: String,
    },

    /// Describe a topic's partition layout
    Describe {
        name: String,

        #[arg(short, long, default_value = "127.0.0.1:9093")]
        controller: String,
    },

    /// Delete a topic
    Delete {
        name: String,

        #[arg(short, long, default_value = "127.0.0.1:9093")]
        controller: String,
    },
}

#[derive(Subcommand)]
enum GroupCommands {
    /// List consumer groups
    List {
        #[arg(short, long, default_value = "127.0.0.1:9094")]
        coordinator: String,
    },

    /// Describe a group: members and committed offsets
    Describe {
        name: String,

        #[arg(short, long, default_value = "127.0.0.1:9094")]
        coordinator: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Produce {
            topic,
            value,
            key,
            partition,
            producer_id,
            sequence,
            broker,
        } => {
            let mut client = BrokerClient::connect(&broker).await?;
            let record = RecordData {
                key: key.map(Bytes::from).unwrap_or_default(),
                value: Bytes::from(value),
                timestamp_ms: 0,
            };
            let outcome = client
                .produce(
                    &topic,
                    partition,
                    vec![record],
                    AckMode::Leader,
                    producer_id.as_deref().unwrap_or(""),
                    sequence,
                )
                .await?;
            match outcome.error_code {
                ErrorCode::Ok => {
                    println!("offset {}", outcome.base_offset)
                }
                ErrorCode::IdempotentReplay => {
                    println!("replay, original offset {}", outcome.base_offset)
                }
                code => anyhow::bail!("{code}: {}", outcome.error_message),
            }
        }

        Commands::Consume {
            topic,
            partition,
            mut offset,
            max_bytes,
            follow,
            group,
            coordinator,
            broker,
        } => {
            let mut client = BrokerClient::connect(&broker).await?;

            let mut group_session = match &group {
                Some(group_id) => {
                    let member_id = format!("weir-cli-{}", uuid::Uuid::new_v4());
                    let mut coord = CoordinatorClient::connect(&coordinator).await?;
                    coord
                        .poll_assignment(group_id, &member_id, vec![topic.clone()])
                        .await?;
                    let committed = coord
                        .get_committed_offset(group_id, &topic, partition)
                        .await?;
                    offset = offset.max(committed);
                    Some((coord, group_id.clone(), member_id))
                }
                None => None,
            };

            loop {
                let outcome = client.fetch(&topic, partition, offset, max_bytes).await?;
                match outcome.error_code {
                    ErrorCode::Ok => {}
                    ErrorCode::OffsetOutOfRange if follow => {
                        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
                        continue;
                    }
                    code => anyhow::bail!("{code}: {}", outcome.error_message),
                }

                for batch in &outcome.batches {
                    for (i, record) in batch.records.iter().enumerate() {
                        let record_offset = batch.base_offset + i as i64;
                        if record_offset < offset {
                            continue;
                        }
                        println!(
                            "{record_offset}\t{}\t{}",
                            String::from_utf8_lossy(&record.key),
                            String::from_utf8_lossy(&record.value),
                        );
                        offset = record_offset + 1;
                    }
                }

                if let Some((coord, group_id, member_id)) = group_session.as_mut() {
                    coord
                        .commit_offset(group_id, &topic, partition, offset)
                        .await?;
                    coord.heartbeat(group_id, member_id).await?;
                }

                if !follow && outcome.batches.is_empty() {
                    break;
                }
                if follow && outcome.batches.is_empty() {
                    tokio::time::sleep(std::time::Duration::from_millis(500)).await;
                }
            }

            if let Some((mut coord, group_id, member_id)) = group_session {
                coord.leave_group(&group_id, &member_id).await?;
            }
        }

        Commands::Topic { action } => match action {
            TopicCommands::Create {
                name,
                partitions,
                replication_factor,
                controller,
            } => {
                let mut client = ControllerClient::connect(&controller).await?;
                client
                    .create_topic(&name, partitions, replication_factor)
                    .await?;
                println!("created topic '{name}' with {partitions} partitions");
            }
            TopicCommands::List { controller } => {
                let mut client = ControllerClient::connect(&controller).await?;
                let topics = client.list_topics().await?;
                if topics.is_empty() {
                    println!("no topics");
                }
                for topic in topics {
                    println!("{topic}");
                }
            }
            TopicCommands::Describe { name, controller } => {
                let mut client = ControllerClient::connect(&controller).await?;
                let partitions = client.describe_topic(&name).await?;
                println!("topic: {name}");
                for p in partitions {
                    println!(
                        "  partition {} leader {} replicas {:?} isr {:?} hw {}",
                        p.partition, p.leader, p.replicas, p.isr, p.high_watermark
                    );
                }
            }
            TopicCommands::Delete { name, controller } => {
                let mut client = ControllerClient::connect(&controller).await?;
                client.delete_topic(&name).await?;
                println!("deleted topic '{name}'");
            }
        },

        Commands::Group { action } => match action {
            GroupCommands::List { coordinator } => {
                let mut client = CoordinatorClient::connect(&coordinator).await?;
                let groups = client.list_groups().await?;
                if groups.is_empty() {
                    println!("no consumer groups");
                }
                for group in groups {
                    println!("{group}");
                }
            }
            GroupCommands::Describe { name, coordinator } => {
                let mut client = CoordinatorClient::connect(&coordinator).await?;
                let (members, committed) = client.describe_group(&name).await?;
                println!("group: {name}");
                println!("members: {}", members.len());
                for member in &members {
                    println!("  {member}");
                }
                if committed.is_empty() {
                    println!("no committed offsets");
                }
                for entry in committed {
                    println!(
                        "  {}/{} -> {}",
                        entry.topic, entry.partition, entry.offset
                    );
                }
            }
        },
    }

    Ok(())
}
