//! Processor Tasks - API Request, CM Event, and Internal Command processing
//!
//! This module contains the processing loops that feed the AVRCP profile. All
//! loops share the global `AvrcpProfile` via a mutex. Each loop locks the
//! profile, hands it one message, takes the produced output and releases the
//! lock before forwarding the output, so no await happens with the lock held.
//!
//! # Usage
//!
//! Run the processor as an Embassy task next to your Connection Manager:
//!
//! ```rust,no_run
//! use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel};
//! use remotebird::{AvrcpOptions, cm::{ChannelCm, CmEvent, CmRequest}, processor};
//!
//! static CM_REQUESTS: Channel<CriticalSectionRawMutex, CmRequest, 8> = Channel::new();
//! static CM_EVENTS: Channel<CriticalSectionRawMutex, CmEvent, 8> = Channel::new();
//!
//! # async fn example() {
//! let cm = ChannelCm::new(&CM_REQUESTS, &CM_EVENTS);
//! processor::run(AvrcpOptions::default(), &cm).await;
//! # }
//! ```
//!
//! # Architecture
//!
//! * **API Request Processor**: hands application requests to the profile
//! * **CM Event Processor**: hands Connection Manager confirmations and indications to the profile
//! * **Internal Command Processor**: replays requests the profile deferred while busy

use crate::{
    AvrcpOptions, EVENT_CHANNEL, INTERNAL_COMMAND_CHANNEL, REQUEST_CHANNEL,
    cm::ConnectionManager,
    profile::{AvrcpProfile, Output},
    with_avrcp,
};

async fn api_request_processor<C: ConnectionManager>(cm: &C) -> ! {
    loop {
        let request = REQUEST_CHANNEL.receive().await;
        process(cm, |profile| profile.handle_request(request)).await;
    }
}

async fn cm_event_processor<C: ConnectionManager>(cm: &C) -> ! {
    loop {
        let event = cm.receive().await;
        process(cm, |profile| profile.handle_cm_event(event)).await;
    }
}

async fn internal_command_processor<C: ConnectionManager>(cm: &C) -> ! {
    loop {
        let command = INTERNAL_COMMAND_CHANNEL.receive().await;
        debug!("[PROCESSOR] Internal command {:?}", crate::fmt::Dbg(&command));
        process(cm, |profile| profile.handle_internal_command(command)).await;
    }
}

/// Run `f` on the profile and forward what it produced
async fn process<C: ConnectionManager>(cm: &C, f: impl FnOnce(&mut AvrcpProfile)) {
    let output = with_avrcp(|profile| {
        f(profile);
        profile.take_output()
    })
    .await;
    match output {
        Ok(output) => flush(cm, output).await,
        Err(e) => error!("[PROCESSOR] {}", e),
    }
}

/// Forward CM requests first, then application events, then internal commands
async fn flush<C: ConnectionManager>(cm: &C, output: Output) {
    if output.is_empty() {
        return;
    }
    for request in output.cm {
        cm.send(request).await;
    }
    for event in output.events {
        EVENT_CHANNEL.send(event).await;
    }
    for command in output.internal {
        INTERNAL_COMMAND_CHANNEL.send(command).await;
    }
}

/// Initialize the profile, register the AVCTP PSMs and process forever.
///
/// Returns only if the profile was already initialized.
pub async fn run<C: ConnectionManager>(options: AvrcpOptions, cm: &C) {
    if let Err(e) = crate::init_avrcp(options).await {
        error!("[PROCESSOR] Failed to initialize AVRCP: {}", e);
        return;
    }
    info!("[PROCESSOR] AVRCP profile started");
    process(cm, AvrcpProfile::init).await;

    embassy_futures::select::select3(
        api_request_processor(cm),
        cm_event_processor(cm),
        internal_command_processor(cm),
    )
    .await;
}
