use super::Query;
use crate::error::{OrmError, OrmResult};
use crate::query_builder::AggregateFunction;
use crate::registry::MethodHandler;
use serde_json::Value;
use tracing::{trace, warn};

/// Outcome of a dynamically dispatched call
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatched {
    /// The call modified the query; keep chaining on it
    Chained,
    /// The call produced a value instead of the query
    Value(Value),
}

impl Dispatched {
    pub fn into_value(self) -> Option<Value> {
        match self {
            Dispatched::Chained => None,
            Dispatched::Value(value) => Some(value),
        }
    }
}

/// Methods forwarded to the scoped statement whose result is returned
/// in place of the query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassthroughMethod {
    Count,
    Exists,
    DoesntExist,
    Min,
    Max,
    Sum,
    Avg,
    ToSql,
    RawBindings,
}

impl PassthroughMethod {
    pub fn parse(method: &str) -> Option<Self> {
        let method = match method.to_ascii_lowercase().as_str() {
            "count" => PassthroughMethod::Count,
            "exists" => PassthroughMethod::Exists,
            "doesnt_exist" => PassthroughMethod::DoesntExist,
            "min" => PassthroughMethod::Min,
            "max" => PassthroughMethod::Max,
            "sum" => PassthroughMethod::Sum,
            "avg" | "average" => PassthroughMethod::Avg,
            "to_sql" => PassthroughMethod::ToSql,
            "raw_bindings" | "get_bindings" => PassthroughMethod::RawBindings,
            _ => return None,
        };
        Some(method)
    }
}

impl Query {
    /// Call a method by name.
    ///
    /// Resolution follows the context's resolver chain: local macros, global
    /// macros, named scopes, the passthrough allowlist, then the statement
    /// builder. Names nothing resolves fail with
    /// [`OrmError::BadMethodCall`].
    pub async fn call(&mut self, method: &str, args: &[Value]) -> OrmResult<Dispatched> {
        let ctx = std::sync::Arc::clone(&self.ctx);
        let Some((resolver, handler)) = ctx.dispatch_chain().resolve(self, method) else {
            warn!(model = %self.model.name(), method = %method, "No resolver matched method call");
            return Err(self.bad_method_call(method));
        };
        trace!(method = %method, resolver = %resolver, "Dispatching method call");

        match handler {
            MethodHandler::LocalMacro(body) | MethodHandler::GlobalMacro(body) => {
                Ok(match body(Some(&mut *self), args)? {
                    Some(value) => Dispatched::Value(value),
                    None => Dispatched::Chained,
                })
            }
            MethodHandler::NamedScope(scope) => {
                self.call_scope(|query| scope(query, args))?;
                Ok(Dispatched::Chained)
            }
            MethodHandler::Passthrough(passthrough) => self
                .passthrough(passthrough, method, args)
                .await
                .map(Dispatched::Value),
            MethodHandler::Forward(forward) => {
                forward(&mut self.statement, args)?;
                Ok(Dispatched::Chained)
            }
        }
    }

    async fn passthrough(&self, passthrough: PassthroughMethod, method: &str, args: &[Value]) -> OrmResult<Value> {
        let column = || {
            args.first()
                .and_then(Value::as_str)
                .ok_or_else(|| OrmError::invalid_argument(method, "expected a column name"))
        };

        match passthrough {
            PassthroughMethod::Count => {
                let column = args.first().and_then(Value::as_str).unwrap_or("*");
                self.aggregate(AggregateFunction::Count, column).await
            }
            PassthroughMethod::Exists => Ok(Value::Bool(self.exists().await?)),
            PassthroughMethod::DoesntExist => Ok(Value::Bool(!self.exists().await?)),
            PassthroughMethod::Min => self.aggregate(AggregateFunction::Min, column()?).await,
            PassthroughMethod::Max => self.aggregate(AggregateFunction::Max, column()?).await,
            PassthroughMethod::Sum => self.aggregate(AggregateFunction::Sum, column()?).await,
            PassthroughMethod::Avg => self.aggregate(AggregateFunction::Avg, column()?).await,
            PassthroughMethod::ToSql => Ok(Value::String(self.to_sql())),
            PassthroughMethod::RawBindings => Ok(Value::Array(self.raw_bindings())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough_allowlist() {
        assert_eq!(PassthroughMethod::parse("average"), Some(PassthroughMethod::Avg));
        assert_eq!(PassthroughMethod::parse("get_bindings"), Some(PassthroughMethod::RawBindings));
        assert_eq!(PassthroughMethod::parse("Count"), Some(PassthroughMethod::Count));
        assert_eq!(PassthroughMethod::parse("where"), None);
    }
}
