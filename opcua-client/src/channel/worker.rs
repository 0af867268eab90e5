//! Reader and token renewal tasks of a channel
//!
//! Both tasks hold only a weak reference to the channel between iterations,
//! so dropping the last `SecureChannel` handle ends them.

use super::{channel_closed, ChannelEvent, ChannelShared, SecureChannel};
use opcua_conversation::{read_frame, AssemblyOutcome, Frame, MessageAssembler, TransportLimits};
use opcua_core::{StatusCode, UaError, UaResult};
use opcua_services::SecurityTokenRequestType;
use opcua_transport::stream::BoxedReader;
use std::sync::Weak;
use tokio_util::sync::CancellationToken;

/// Short name of a frame for log and error messages
pub(super) fn frame_kind(frame: &Frame) -> &'static str {
    match frame {
        Frame::Hello(_) => "HEL",
        Frame::Acknowledge(_) => "ACK",
        Frame::Error(_) => "ERR",
        Frame::ReverseHello(_) => "RHE",
        Frame::Chunk(_) => "secure chunk",
    }
}

/// Read frames until the channel shuts down or the stream fails
pub(super) async fn read_loop(
    shared: Weak<ChannelShared>,
    mut reader: BoxedReader,
    limits: TransportLimits,
    shutdown: CancellationToken,
) {
    let mut assembler = MessageAssembler::new(
        limits.max_receive_message_size as usize,
        limits.max_receive_chunk_count as usize,
    );
    let max_chunk = limits.receive_buffer_size as usize;
    loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => break,
            frame = read_frame(&mut reader, max_chunk) => frame,
        };
        let Some(shared) = shared.upgrade() else { break };
        let channel = SecureChannel { shared };
        if let Err(error) = dispatch(&channel, &mut assembler, frame).await {
            if !shutdown.is_cancelled() {
                channel.fault(&error).await;
            }
            break;
        }
    }
    log::debug!("Channel reader stopped ({} partial messages dropped)", assembler.pending());
}

async fn dispatch(channel: &SecureChannel, assembler: &mut MessageAssembler, frame: UaResult<Frame>) -> UaResult<()> {
    let chunk = match frame? {
        Frame::Chunk(chunk) => chunk,
        Frame::Error(message) => return Err(message.into_error()),
        other => {
            return Err(UaError::protocol(
                StatusCode::BAD_TCP_MESSAGE_TYPE_INVALID,
                format!("Unexpected {} on an open channel", frame_kind(&other)),
            ))
        }
    };
    let opened = {
        let mut conversation = channel.shared.conversation.lock().await;
        let conversation = conversation.as_mut().ok_or_else(channel_closed)?;
        conversation.context.open_chunk(&chunk)?
    };

    let pending = &channel.shared.pending;
    match assembler.push(opened)? {
        AssemblyOutcome::Incomplete => {}
        AssemblyOutcome::Complete(message) => {
            pending.resolve(message.request_id, Ok(message.body));
        }
        AssemblyOutcome::Aborted {
            request_id,
            status,
            reason,
        } => {
            log::warn!("Server aborted response to request {}: {} {}", request_id, status, reason);
            pending.resolve(request_id, Err(UaError::ServiceFault(status)));
        }
        AssemblyOutcome::Rejected { request_id, error } => {
            pending.resolve(request_id, Err(error));
        }
    }
    Ok(())
}

/// Renew the security token whenever the renewal point of the current one is reached
pub(super) async fn renew_loop(shared: Weak<ChannelShared>, shutdown: CancellationToken) {
    loop {
        let delay = match shared.upgrade() {
            Some(shared) => shared.renewal_delay().await,
            None => return,
        };
        let Some(delay) = delay else {
            log::debug!("Token has no lifetime, renewal disabled");
            return;
        };
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }

        let Some(shared) = shared.upgrade() else { return };
        let channel = SecureChannel { shared };
        match channel.request_token(SecurityTokenRequestType::Renew).await {
            Ok(token) => {
                log::info!("Renewed security token, now {}", token.token_id);
                let _ = channel.shared.events.send(ChannelEvent::TokenRenewed {
                    token_id: token.token_id,
                });
            }
            Err(error) => {
                if shutdown.is_cancelled() {
                    return;
                }
                log::error!("Security token renewal failed: {}", error);
                channel.fault(&error).await;
                return;
            }
        }
    }
}
