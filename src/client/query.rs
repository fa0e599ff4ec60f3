//! Database operations built on the context send/read cycle.
//!
//! Query results may span several response parts. Values from parts of the
//! expected kind are concatenated in arrival order, and the reported version
//! is the first non-zero version seen.
use log::debug;

use crate::{
    protocol::{Envelope, RequestBody, ResponseBody, ResponsePayload, StatusCode, Stream},
    types::{ChangedRange, RawPoint, StatPoint, StreamId},
};

use super::{ClientError, Connection, RequestContext};

fn payloads(parts: &[Envelope]) -> Result<Vec<ResponsePayload>, ClientError> {
    parts
        .iter()
        .map(|p| p.payload::<ResponsePayload>().map_err(ClientError::from))
        .collect()
}

/// Pulls `(version, values)` out of every part `pick` recognises.
fn collect<T>(
    parts: &[Envelope],
    pick: impl Fn(ResponseBody) -> Option<(u64, Vec<T>)>,
) -> Result<(Vec<T>, Option<u64>), ClientError> {
    let mut values = Vec::new();
    let mut version = None;

    for payload in payloads(parts)? {
        if payload.status != StatusCode::Ok {
            return Err(ClientError::Status(payload.status));
        }
        if let Some((v, mut batch)) = pick(payload.body) {
            if version.is_none() && v != 0 {
                version = Some(v);
            }
            values.append(&mut batch);
        }
    }
    Ok((values, version))
}

fn status(parts: &[Envelope]) -> Result<String, ClientError> {
    let first = parts
        .first()
        .ok_or_else(|| ClientError::UnexpectedResponse("empty response".into()))?;
    let payload: ResponsePayload = first.payload()?;
    Ok(payload.status.to_string())
}

fn records(body: ResponseBody) -> Option<(u64, Vec<RawPoint>)> {
    match body {
        ResponseBody::Records { version, values } => Some((version, values)),
        _ => None,
    }
}

fn statistical_records(body: ResponseBody) -> Option<(u64, Vec<StatPoint>)> {
    match body {
        ResponseBody::StatisticalRecords { version, values } => Some((version, values)),
        _ => None,
    }
}

impl<S: Stream> RequestContext<'_, S> {
    /// Raw points in `[start_time, end_time)`. A `version` of 0 reads the latest.
    pub fn query_standard_values(
        &mut self,
        uuid: StreamId,
        start_time: i64,
        end_time: i64,
        version: u64,
    ) -> Result<(Vec<RawPoint>, Option<u64>), ClientError> {
        let parts = self.call(RequestBody::QueryStandardValues {
            uuid,
            start_time,
            end_time,
            version,
        })?;
        collect(&parts, records)
    }

    /// Aggregates over windows of `2^point_width` nanoseconds.
    pub fn query_statistical_values(
        &mut self,
        uuid: StreamId,
        start_time: i64,
        end_time: i64,
        point_width: u8,
        version: u64,
    ) -> Result<(Vec<StatPoint>, Option<u64>), ClientError> {
        let parts = self.call(RequestBody::QueryStatisticalValues {
            uuid,
            start_time,
            end_time,
            point_width,
            version,
        })?;
        collect(&parts, statistical_records)
    }

    /// Aggregates over windows of `width` nanoseconds. Window edges are exact
    /// for a `depth` of 0 and rounded to `2^depth` nanoseconds otherwise.
    pub fn query_window_values(
        &mut self,
        uuid: StreamId,
        start_time: i64,
        end_time: i64,
        width: u64,
        depth: u8,
        version: u64,
    ) -> Result<(Vec<StatPoint>, Option<u64>), ClientError> {
        let parts = self.call(RequestBody::QueryWindowValues {
            uuid,
            start_time,
            end_time,
            width,
            depth,
            version,
        })?;
        collect(&parts, statistical_records)
    }

    /// Latest version number of each stream, in request order.
    pub fn query_version(&mut self, uuids: &[StreamId]) -> Result<Vec<u64>, ClientError> {
        let parts = self.call(RequestBody::QueryVersion {
            uuids: uuids.to_vec(),
        })?;
        let (versions, _) = collect(&parts, |body| match body {
            ResponseBody::VersionList { versions, .. } => Some((0, versions)),
            _ => None,
        })?;
        Ok(versions)
    }

    /// Closest point to `time`: at or after it when `backward` is false,
    /// strictly before it when `backward` is true.
    pub fn query_nearest_value(
        &mut self,
        uuid: StreamId,
        time: i64,
        backward: bool,
        version: u64,
    ) -> Result<(Vec<RawPoint>, Option<u64>), ClientError> {
        let parts = self.call(RequestBody::QueryNearestValue {
            uuid,
            time,
            backward,
            version,
        })?;
        collect(&parts, records)
    }

    /// Time ranges that changed between `from_generation` and
    /// `to_generation` (exclusive), at a precision of `2^resolution` ns.
    pub fn query_changed_ranges(
        &mut self,
        uuid: StreamId,
        from_generation: u64,
        to_generation: u64,
        resolution: u8,
    ) -> Result<(Vec<ChangedRange>, Option<u64>), ClientError> {
        let parts = self.call(RequestBody::QueryChangedRanges {
            uuid,
            from_generation,
            to_generation,
            resolution,
        })?;
        collect(&parts, |body| match body {
            ResponseBody::ChangedRngList { version, values } => Some((version, values)),
            _ => None,
        })
    }

    /// Inserts `points`. With `sync` the server commits before answering.
    /// Returns the server's status string.
    pub fn insert_values(
        &mut self,
        uuid: StreamId,
        points: &[RawPoint],
        sync: bool,
    ) -> Result<String, ClientError> {
        debug!("inserting {} points into {uuid}", points.len());
        let parts = self.call(RequestBody::InsertValues {
            uuid,
            values: points.to_vec(),
            sync,
        })?;
        status(&parts)
    }

    /// Deletes points in `[start_time, end_time)`. Returns the server's status string.
    pub fn delete_values(
        &mut self,
        uuid: StreamId,
        start_time: i64,
        end_time: i64,
    ) -> Result<String, ClientError> {
        let parts = self.call(RequestBody::DeleteValues {
            uuid,
            start_time,
            end_time,
        })?;
        status(&parts)
    }
}

/// One-shot versions of the context operations. Each call uses a fresh
/// context that is released before returning. Prefer a long-lived context
/// for many serial calls from one thread.
impl<S: Stream> Connection<S> {
    pub fn query_standard_values(
        &self,
        uuid: StreamId,
        start_time: i64,
        end_time: i64,
        version: u64,
    ) -> Result<(Vec<RawPoint>, Option<u64>), ClientError> {
        self.new_context()
            .query_standard_values(uuid, start_time, end_time, version)
    }

    pub fn query_statistical_values(
        &self,
        uuid: StreamId,
        start_time: i64,
        end_time: i64,
        point_width: u8,
        version: u64,
    ) -> Result<(Vec<StatPoint>, Option<u64>), ClientError> {
        self.new_context()
            .query_statistical_values(uuid, start_time, end_time, point_width, version)
    }

    pub fn query_window_values(
        &self,
        uuid: StreamId,
        start_time: i64,
        end_time: i64,
        width: u64,
        depth: u8,
        version: u64,
    ) -> Result<(Vec<StatPoint>, Option<u64>), ClientError> {
        self.new_context()
            .query_window_values(uuid, start_time, end_time, width, depth, version)
    }

    pub fn query_version(&self, uuids: &[StreamId]) -> Result<Vec<u64>, ClientError> {
        self.new_context().query_version(uuids)
    }

    pub fn query_nearest_value(
        &self,
        uuid: StreamId,
        time: i64,
        backward: bool,
        version: u64,
    ) -> Result<(Vec<RawPoint>, Option<u64>), ClientError> {
        self.new_context()
            .query_nearest_value(uuid, time, backward, version)
    }

    pub fn query_changed_ranges(
        &self,
        uuid: StreamId,
        from_generation: u64,
        to_generation: u64,
        resolution: u8,
    ) -> Result<(Vec<ChangedRange>, Option<u64>), ClientError> {
        self.new_context()
            .query_changed_ranges(uuid, from_generation, to_generation, resolution)
    }

    pub fn insert_values(
        &self,
        uuid: StreamId,
        points: &[RawPoint],
        sync: bool,
    ) -> Result<String, ClientError> {
        self.new_context().insert_values(uuid, points, sync)
    }

    pub fn delete_values(
        &self,
        uuid: StreamId,
        start_time: i64,
        end_time: i64,
    ) -> Result<String, ClientError> {
        self.new_context()
            .delete_values(uuid, start_time, end_time)
    }
}
