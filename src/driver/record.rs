//! Record - 쿼리 결과 레코드
//!
//! 값은 변환 없이 PackStream 값 그대로 노출합니다.

use std::collections::HashMap;
use std::sync::Arc;

use crate::bolt::{BoltMap, PackStreamValue};

use super::error::{DriverError, DriverResult};

/// 결과 값 (PackStream 값)
pub type Value = PackStreamValue;

// ============================================================================
// Record - 단일 레코드
// ============================================================================

/// 쿼리 결과 레코드
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// 컬럼 키 (같은 결과의 레코드끼리 공유)
    keys: Arc<[String]>,
    /// 값들
    values: Vec<Value>,
}

impl Record {
    /// 새 레코드 생성
    pub fn new(keys: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { keys, values }
    }

    /// 키 목록
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// 값 목록
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// 레코드 길이
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// 빈 레코드 여부
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// 키로 값 가져오기
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.keys
            .iter()
            .position(|k| k == key)
            .and_then(|i| self.values.get(i))
    }

    /// 인덱스로 값 가져오기
    pub fn get_by_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// 값이 반드시 있어야 하는 경우
    fn require(&self, key: &str) -> DriverResult<&Value> {
        self.get(key)
            .ok_or_else(|| DriverError::session(format!("Key '{}' not found in record", key)))
    }

    /// Integer 값 가져오기
    pub fn get_int(&self, key: &str) -> DriverResult<i64> {
        self.require(key)?
            .as_int()
            .ok_or_else(|| DriverError::session(format!("Key '{}' is not an integer", key)))
    }

    /// String 값 가져오기
    pub fn get_str(&self, key: &str) -> DriverResult<&str> {
        self.require(key)?
            .as_str()
            .ok_or_else(|| DriverError::session(format!("Key '{}' is not a string", key)))
    }

    /// Boolean 값 가져오기
    pub fn get_bool(&self, key: &str) -> DriverResult<bool> {
        self.require(key)?
            .as_bool()
            .ok_or_else(|| DriverError::session(format!("Key '{}' is not a boolean", key)))
    }

    /// Map으로 변환
    pub fn to_map(&self) -> HashMap<String, Value> {
        self.keys
            .iter()
            .cloned()
            .zip(self.values.iter().cloned())
            .collect()
    }

    /// 키 존재 여부
    pub fn contains_key(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }
}

impl<'a> IntoIterator for &'a Record {
    type Item = (&'a String, &'a Value);
    type IntoIter = std::iter::Zip<std::slice::Iter<'a, String>, std::slice::Iter<'a, Value>>;

    fn into_iter(self) -> Self::IntoIter {
        self.keys.iter().zip(self.values.iter())
    }
}

// ============================================================================
// QueryResult - 전체 결과
// ============================================================================

/// RUN + PULL 결과
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    /// 컬럼 키
    pub keys: Vec<String>,
    /// 레코드들
    pub records: Vec<Record>,
    /// 북마크 (자동 커밋 쿼리만)
    pub bookmark: Option<String>,
    /// 실행된 데이터베이스
    pub database: Option<String>,
    /// 마지막 SUCCESS 메타데이터 (stats, type, t_last 등)
    pub metadata: BoltMap,
}

impl QueryResult {
    /// 레코드 수
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// 빈 결과 여부
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 첫 번째 레코드
    pub fn first(&self) -> Option<&Record> {
        self.records.first()
    }

    /// 정확히 하나의 레코드
    pub fn single(&self) -> DriverResult<&Record> {
        match self.records.as_slice() {
            [record] => Ok(record),
            other => Err(DriverError::session(format!(
                "Expected exactly one record, got {}",
                other.len()
            ))),
        }
    }

    /// 레코드 반복자
    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    /// 쿼리 타입 (`r`, `w`, `rw`, `s`)
    pub fn query_type(&self) -> Option<&str> {
        self.metadata.get("type").and_then(|v| v.as_str())
    }
}

impl IntoIterator for QueryResult {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(names: &[&str]) -> Arc<[String]> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_record_access() {
        let record = Record::new(
            keys(&["name", "age", "active"]),
            vec!["Alice".into(), 30i64.into(), true.into()],
        );

        assert_eq!(record.len(), 3);
        assert_eq!(record.get_str("name").unwrap(), "Alice");
        assert_eq!(record.get_int("age").unwrap(), 30);
        assert!(record.get_bool("active").unwrap());
        assert_eq!(record.get_by_index(1), Some(&Value::Integer(30)));
        assert!(record.contains_key("age"));
        assert!(record.get("missing").is_none());
    }

    #[test]
    fn test_record_type_mismatch() {
        let record = Record::new(keys(&["n"]), vec!["text".into()]);
        assert!(matches!(record.get_int("n"), Err(DriverError::Session(_))));
        assert!(record.get_int("other").is_err());
    }

    #[test]
    fn test_record_to_map() {
        let record = Record::new(keys(&["a", "b"]), vec![1i64.into(), Value::Null]);
        let map = record.to_map();
        assert_eq!(map.get("a"), Some(&Value::Integer(1)));
        assert_eq!(map.get("b"), Some(&Value::Null));

        let pairs: Vec<_> = (&record).into_iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(pairs, vec!["a", "b"]);
    }

    #[test]
    fn test_query_result_single() {
        let shared = keys(&["x"]);
        let mut result = QueryResult {
            keys: vec!["x".to_string()],
            ..Default::default()
        };
        assert!(result.single().is_err());

        result.records.push(Record::new(shared.clone(), vec![1i64.into()]));
        assert_eq!(result.single().unwrap().get_int("x").unwrap(), 1);

        result.records.push(Record::new(shared, vec![2i64.into()]));
        assert!(result.single().is_err());
        assert_eq!(result.len(), 2);
    }
}
