use std::sync::Arc;

use anyhow::Result;

pub trait Request {
    type Resp;
}

pub trait Queryable<Req: Request> {
    fn query(&self, req: Req) -> Result<Req::Resp>;
}

pub trait Commandable<Req: Request> {
    fn execute(&self, req: Req) -> Result<Req::Resp>;
}

impl<Req: Request, S: Queryable<Req>> Queryable<Req> for Arc<S> {
    fn query(&self, req: Req) -> Result<Req::Resp> {
        (**self).query(req)
    }
}

impl<Req: Request, S: Commandable<Req>> Commandable<Req> for Arc<S> {
    fn execute(&self, req: Req) -> Result<Req::Resp> {
        (**self).execute(req)
    }
}
