// Copyright (c) 2023 RBB S.r.l
// opensource@mintlayer.org
// SPDX-License-Identifier: MIT
// Licensed under the MIT License;
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://github.com/mintlayer/mintlayer-core/blob/master/LICENSE
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The dedicated template-builder thread and its request-reply channel.
//!
//! The worker owns its mempool mirror and shares no memory with the
//! orchestrator; snapshots travel into it by value. The protocol is
//! strictly request-reply with one outstanding request. If the thread dies,
//! the pending reply channel is dropped and the requester observes
//! [`WorkerError::ChannelClosed`]; the handle is then discarded and a fresh
//! worker is spawned lazily on the next use.

use std::thread;

use tokio::sync::{mpsc, oneshot};

use logging::log;

use crate::error::WorkerError;

use super::{TemplateBuilder, TemplateCommand, TemplateResult};

pub struct TemplateWorkerHandle {
    request_tx: mpsc::UnboundedSender<WorkerRequest>,
}

struct WorkerRequest {
    command: TemplateCommand,
    reply_to: oneshot::Sender<TemplateResult>,
}

impl TemplateWorkerHandle {
    /// Spawn a worker thread with an empty mirror.
    pub fn spawn() -> Result<Self, WorkerError> {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        thread::Builder::new()
            .name("tx-selection".into())
            .spawn(move || worker_main(request_rx))
            .map_err(|err| WorkerError::Spawn(err.to_string()))?;
        log::debug!("Spawned a template worker thread");
        Ok(Self { request_tx })
    }

    /// Send one command and await its reply.
    pub async fn request(&self, command: TemplateCommand) -> Result<TemplateResult, WorkerError> {
        let (reply_to, reply_rx) = oneshot::channel();
        self.request_tx
            .send(WorkerRequest { command, reply_to })
            .map_err(|_| WorkerError::ChannelClosed)?;
        reply_rx.await.map_err(|_| WorkerError::ChannelClosed)
    }
}

fn worker_main(mut request_rx: mpsc::UnboundedReceiver<WorkerRequest>) {
    let mut builder = TemplateBuilder::default();
    while let Some(WorkerRequest { command, reply_to }) = request_rx.blocking_recv() {
        let result = builder.handle(command);
        if reply_to.send(result).is_err() {
            log::warn!("Template worker reply dropped, the requester went away");
        }
    }
    log::debug!("Template worker shutting down");
}
