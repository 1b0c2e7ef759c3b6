// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

//! Typed path parameters.

use warp::{Filter, Rejection};

use rally_model::{EventId, MessageId, ParticipantId, PollId, TaskId, TaskListId};

use crate::rejection;
use rally_service::Error;

macro_rules! id_param {
    ($name:ident, $ty:ty, $entity:literal) => {
        /// Path segment parsed into the typed id; non-numeric values reject with 404.
        pub(crate) fn $name() -> impl Filter<Extract = ($ty,), Error = Rejection> + Copy {
            warp::path::param().and_then(|value: String| async move {
                value
                    .parse::<$ty>()
                    .map_err(|_| rejection::reject(Error::not_found($entity)))
            })
        }
    };
}

id_param!(event_id, EventId, "event");
id_param!(task_list_id, TaskListId, "task list");
id_param!(task_id, TaskId, "task");
id_param!(poll_id, PollId, "poll");
id_param!(message_id, MessageId, "message");
id_param!(participant_id, ParticipantId, "participant");
