// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

//! Board, columns and tasks: snapshot, CRUD, reorder, status, assignment.

use serde::Deserialize;
use time::OffsetDateTime;
use warp::{filters::BoxedFilter, http::StatusCode, Filter, Rejection, Reply};

use rally_model::{EventId, ParticipantId, TaskId, TaskListId, TaskStatus, UserId};
use rally_service::board::{TaskInput, TaskListInput, TaskUpdate};

use crate::{
    auth::authenticated,
    filters::with_args,
    path_params,
    rejection,
    routes::{double_option, double_option_rfc3339},
    ApiArgs,
};

#[derive(Deserialize)]
struct TaskListBody {
    title: String,
}

#[derive(Deserialize)]
struct ReorderBody<I> {
    ordered_ids: Vec<I>,
}

#[derive(Deserialize)]
struct TaskBody {
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    status: Option<TaskStatus>,
    #[serde(default)]
    assignee: Option<ParticipantId>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    start_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    due_at: Option<OffsetDateTime>,
    #[serde(default)]
    depends_on: Vec<TaskId>,
}

#[derive(Deserialize)]
struct TaskPatchBody {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    status: Option<TaskStatus>,
    #[serde(default, deserialize_with = "double_option")]
    assignee: Option<Option<ParticipantId>>,
    #[serde(default, deserialize_with = "double_option_rfc3339")]
    start_at: Option<Option<OffsetDateTime>>,
    #[serde(default, deserialize_with = "double_option_rfc3339")]
    due_at: Option<Option<OffsetDateTime>>,
    #[serde(default)]
    depends_on: Option<Vec<TaskId>>,
}

#[derive(Deserialize)]
struct StatusBody {
    status: TaskStatus,
}

#[derive(Deserialize)]
struct AssignBody {
    assignee_participant_id: Option<ParticipantId>,
}

fn events_path() -> impl Filter<Extract = (), Error = Rejection> + Copy {
    warp::path("api").and(warp::path("events"))
}

fn tasklists_path() -> impl Filter<Extract = (), Error = Rejection> + Copy {
    warp::path("api").and(warp::path("tasklists"))
}

fn tasks_path() -> impl Filter<Extract = (), Error = Rejection> + Copy {
    warp::path("api").and(warp::path("tasks"))
}

pub(crate) fn filter(args: ApiArgs) -> BoxedFilter<(impl Reply,)> {
    let board = events_path()
        .and(path_params::event_id())
        .and(warp::path("board"))
        .and(warp::path::end())
        .and(warp::get())
        .and(authenticated(args.clone()))
        .and(with_args(args.clone()))
        .and_then(board);

    let create_list = events_path()
        .and(path_params::event_id())
        .and(warp::path("tasklists"))
        .and(warp::path::end())
        .and(warp::post())
        .and(authenticated(args.clone()))
        .and(warp::body::json())
        .and(with_args(args.clone()))
        .and_then(create_list);

    let reorder_lists = events_path()
        .and(path_params::event_id())
        .and(warp::path("tasklists"))
        .and(warp::path("reorder"))
        .and(warp::path::end())
        .and(warp::post())
        .and(authenticated(args.clone()))
        .and(warp::body::json())
        .and(with_args(args.clone()))
        .and_then(reorder_lists);

    let rename_list = tasklists_path()
        .and(path_params::task_list_id())
        .and(warp::path::end())
        .and(warp::patch())
        .and(authenticated(args.clone()))
        .and(warp::body::json())
        .and(with_args(args.clone()))
        .and_then(rename_list);

    let delete_list = tasklists_path()
        .and(path_params::task_list_id())
        .and(warp::path::end())
        .and(warp::delete())
        .and(authenticated(args.clone()))
        .and(with_args(args.clone()))
        .and_then(delete_list);

    let create_task = tasklists_path()
        .and(path_params::task_list_id())
        .and(warp::path("tasks"))
        .and(warp::path::end())
        .and(warp::post())
        .and(authenticated(args.clone()))
        .and(warp::body::json())
        .and(with_args(args.clone()))
        .and_then(create_task);

    let reorder_tasks = tasklists_path()
        .and(path_params::task_list_id())
        .and(warp::path("tasks"))
        .and(warp::path("reorder"))
        .and(warp::path::end())
        .and(warp::post())
        .and(authenticated(args.clone()))
        .and(warp::body::json())
        .and(with_args(args.clone()))
        .and_then(reorder_tasks);

    let update_task = tasks_path()
        .and(path_params::task_id())
        .and(warp::path::end())
        .and(warp::patch())
        .and(authenticated(args.clone()))
        .and(warp::body::json())
        .and(with_args(args.clone()))
        .and_then(update_task);

    let delete_task = tasks_path()
        .and(path_params::task_id())
        .and(warp::path::end())
        .and(warp::delete())
        .and(authenticated(args.clone()))
        .and(with_args(args.clone()))
        .and_then(delete_task);

    let set_status = tasks_path()
        .and(path_params::task_id())
        .and(warp::path("status"))
        .and(warp::path::end())
        .and(warp::post())
        .and(authenticated(args.clone()))
        .and(warp::body::json())
        .and(with_args(args.clone()))
        .and_then(set_status);

    let assign = tasks_path()
        .and(path_params::task_id())
        .and(warp::path("assign"))
        .and(warp::path::end())
        .and(warp::post())
        .and(authenticated(args.clone()))
        .and(warp::body::json())
        .and(with_args(args.clone()))
        .and_then(assign);

    let take = tasks_path()
        .and(path_params::task_id())
        .and(warp::path("take"))
        .and(warp::path::end())
        .and(warp::post())
        .and(authenticated(args.clone()))
        .and(with_args(args))
        .and_then(take);

    board
        .or(reorder_lists)
        .or(create_list)
        .or(rename_list)
        .or(delete_list)
        .or(reorder_tasks)
        .or(create_task)
        .or(update_task)
        .or(delete_task)
        .or(set_status)
        .or(assign)
        .or(take)
        .boxed()
}

async fn board(event: EventId, user: UserId, args: ApiArgs) -> Result<impl Reply, Rejection> {
    let dto = args.board.board(event, user).await.map_err(rejection::reject)?;
    Ok(warp::reply::json(&dto))
}

async fn create_list(event: EventId, user: UserId, body: TaskListBody, args: ApiArgs) -> Result<impl Reply, Rejection> {
    let dto = args
        .board
        .create_list(user, TaskListInput { event, title: body.title })
        .await
        .map_err(rejection::reject)?;
    Ok(warp::reply::with_status(warp::reply::json(&dto), StatusCode::CREATED))
}

async fn reorder_lists(
    event: EventId,
    user: UserId,
    body: ReorderBody<TaskListId>,
    args: ApiArgs,
) -> Result<impl Reply, Rejection> {
    args.board
        .reorder_lists(event, user, body.ordered_ids)
        .await
        .map_err(rejection::reject)?;
    Ok(warp::reply::json(&serde_json::json!({ "message": "reordered" })))
}

async fn rename_list(list: TaskListId, user: UserId, body: TaskListBody, args: ApiArgs) -> Result<impl Reply, Rejection> {
    let dto = args
        .board
        .rename_list(list, user, &body.title)
        .await
        .map_err(rejection::reject)?;
    Ok(warp::reply::json(&dto))
}

async fn delete_list(list: TaskListId, user: UserId, args: ApiArgs) -> Result<impl Reply, Rejection> {
    args.board.delete_list(list, user).await.map_err(rejection::reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_task(list: TaskListId, user: UserId, body: TaskBody, args: ApiArgs) -> Result<impl Reply, Rejection> {
    let dto = args
        .board
        .create_task(
            user,
            TaskInput {
                list,
                title: body.title,
                description: body.description.unwrap_or_default(),
                status: body.status,
                assignee: body.assignee,
                start_at: body.start_at,
                due_at: body.due_at,
                depends_on: body.depends_on,
            },
        )
        .await
        .map_err(rejection::reject)?;
    Ok(warp::reply::with_status(warp::reply::json(&dto), StatusCode::CREATED))
}

async fn reorder_tasks(
    list: TaskListId,
    user: UserId,
    body: ReorderBody<TaskId>,
    args: ApiArgs,
) -> Result<impl Reply, Rejection> {
    args.board
        .reorder_tasks(list, user, body.ordered_ids)
        .await
        .map_err(rejection::reject)?;
    Ok(warp::reply::json(&serde_json::json!({ "message": "reordered" })))
}

async fn update_task(task: TaskId, user: UserId, body: TaskPatchBody, args: ApiArgs) -> Result<impl Reply, Rejection> {
    let dto = args
        .board
        .update_task(
            task,
            user,
            TaskUpdate {
                title: body.title,
                description: body.description,
                status: body.status,
                assignee: body.assignee,
                start_at: body.start_at,
                due_at: body.due_at,
                depends_on: body.depends_on,
            },
        )
        .await
        .map_err(rejection::reject)?;
    Ok(warp::reply::json(&dto))
}

async fn delete_task(task: TaskId, user: UserId, args: ApiArgs) -> Result<impl Reply, Rejection> {
    args.board.delete_task(task, user).await.map_err(rejection::reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_status(task: TaskId, user: UserId, body: StatusBody, args: ApiArgs) -> Result<impl Reply, Rejection> {
    let dto = args
        .board
        .set_status(task, user, body.status)
        .await
        .map_err(rejection::reject)?;
    Ok(warp::reply::json(&dto))
}

async fn assign(task: TaskId, user: UserId, body: AssignBody, args: ApiArgs) -> Result<impl Reply, Rejection> {
    let dto = args
        .board
        .assign(task, user, body.assignee_participant_id)
        .await
        .map_err(rejection::reject)?;
    Ok(warp::reply::json(&dto))
}

async fn take(task: TaskId, user: UserId, args: ApiArgs) -> Result<impl Reply, Rejection> {
    let dto = args.board.take(task, user).await.map_err(rejection::reject)?;
    Ok(warp::reply::json(&dto))
}
